use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{ItemRecord, crud, init_db};

#[derive(Parser, Debug, Clone)]
pub struct ImportMetaCommand {
    /// 商品元数据 JSON 文件，格式为 `[{ "id": 1, "name": "...", "brand": "...", "imageUrl": "..." }]`
    pub path: PathBuf,
}

impl SubCommandExtend for ImportMetaCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let items: Vec<ItemRecord> = serde_json::from_reader(BufReader::new(File::open(&self.path)?))?;

        let db = init_db(opts.conf_dir.database()).await?;
        crud::upsert_items(&db, &items).await?;
        let total = crud::count_items(&db).await?;

        info!("导入 {} 条商品记录，数据库中共 {} 条", items.len(), total);
        Ok(())
    }
}
