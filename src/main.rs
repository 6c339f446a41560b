use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use media_vault::assets::{self, CATEGORY_PRODUCT};
use media_vault::media::mimetype;
use media_vault::response::{self, Reply, RequestKind};
use media_vault::{Actor, AssetPatch, AssetStore, Config, Database, LifecycleManager, Upload};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// KEY=VALUE settings file
    #[arg(short, long, default_value = ".env")]
    config: PathBuf,

    /// Id of the user on whose behalf the command runs
    #[arg(long, requires = "actor_name")]
    actor_id: Option<i64>,

    #[arg(long)]
    actor_name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema
    Init,
    /// Store an image and its thumbnail
    Upload {
        file: PathBuf,
        #[arg(long, default_value = CATEGORY_PRODUCT)]
        category: String,
        #[arg(long)]
        product: Option<i64>,
        #[arg(long)]
        owner: Option<i64>,
        /// Declared MIME type; sniffed from the content when omitted
        #[arg(long)]
        mime: Option<String>,
        #[arg(long)]
        primary: bool,
        #[arg(long)]
        sort_order: Option<i64>,
    },
    /// Delete an image, its files, and hand over the primary flag
    Delete {
        id: i64,
        /// Refuse unless the image belongs to this product
        #[arg(long)]
        product: Option<i64>,
    },
    /// Make an image its product's primary image
    SetPrimary { id: i64 },
    /// Change category, sort order or display name
    Update {
        id: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        sort_order: Option<i64>,
        #[arg(long)]
        name: Option<String>,
    },
    /// List a product's images in display order
    List { product: i64 },
    /// Show a product's primary image
    Primary { product: i64 },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    info!("DB: {:?}", config.database_path);
    info!("Media root: {:?}", config.media_root);

    let mut db = Database::open(&config.database_path).context("Failed to open database")?;
    let actor = match (args.actor_id, args.actor_name) {
        (Some(id), Some(name)) => Some(Actor::new(id, name)),
        _ => None,
    };

    let (status, body) = match args.command {
        Command::Init => (0, json!({"success": true, "message": "Schema ready"})),
        Command::Upload {
            file,
            category,
            product,
            owner,
            mime,
            primary,
            sort_order,
        } => {
            let bytes = fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let mime = mime.unwrap_or_else(|| mimetype::detect_mimetype(&bytes));
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut upload = Upload::new(&bytes, &name, &mime, &category);
            upload.product_id = product;
            upload.owner_id = owner;
            upload.make_primary = primary;
            upload.sort_order = sort_order;

            let result = AssetStore::new(&mut db, &config).store(&upload, actor.as_ref());
            reply_outcome(response::upload_reply(&result))
        }
        Command::Delete { id, product } => {
            let result = LifecycleManager::new(&mut db, config.media_root.clone())
                .delete_asset(id, product, actor.as_ref());
            reply_outcome(response::delete_reply(&result, RequestKind::Programmatic, ""))
        }
        Command::SetPrimary { id } => {
            let result = LifecycleManager::new(&mut db, config.media_root.clone())
                .set_primary(id, actor.as_ref());
            asset_outcome(result.map(|a| json!(a)))
        }
        Command::Update {
            id,
            category,
            sort_order,
            name,
        } => {
            let patch = AssetPatch {
                category,
                sort_order,
                original_name: name,
            };
            let result = LifecycleManager::new(&mut db, config.media_root.clone())
                .update_metadata(id, &patch, actor.as_ref());
            asset_outcome(result.map(|a| json!(a)))
        }
        Command::List { product } => {
            let images = assets::list_for_product(db.conn(), product)?;
            (0, json!({"success": true, "images": images}))
        }
        Command::Primary { product } => {
            let primary = assets::primary_for_product(db.conn(), product)?;
            (0, json!({"success": true, "image": primary}))
        }
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}

fn asset_outcome(result: media_vault::error::Result<Value>) -> (i32, Value) {
    match result {
        Ok(image) => (0, json!({"success": true, "image": image})),
        Err(e) => (1, response::error_body(&e)),
    }
}

fn reply_outcome(reply: Reply) -> (i32, Value) {
    match reply {
        Reply::Json { status, body } => (i32::from(status >= 400), body),
        Reply::Redirect { location } => (0, json!({"success": true, "location": location})),
    }
}
