pub mod mimetype;
pub mod thumbnail;
pub mod validator;
