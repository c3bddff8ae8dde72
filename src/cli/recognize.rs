use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::debug;
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, open_recognizer};
use crate::config::{ColorOptions, CropOptions, ModelOptions, Opts, OutputFormat, SearchOptions};
use crate::db::init_db;
use crate::enrich::{RecognitionMatch, annotate, enrich};

#[derive(Parser, Debug, Clone)]
pub struct RecognizeCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub crop: CropOptions,
    #[command(flatten)]
    pub color: ColorOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 待识别的图片路径
    pub image: PathBuf,
    /// 从元数据库查询商品信息，没有元数据的结果会被过滤
    #[arg(long)]
    pub with_metadata: bool,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for RecognizeCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let recognizer = open_recognizer(opts, &self.model, &self.crop, &self.color, &self.search)?;

        let results = block_in_place(|| recognizer.recognize(&self.image, self.search.top_k))?;
        debug!("识别结果: {:?}", results);

        let thresholds = self.search.thresholds();
        let matches = if self.with_metadata {
            let db = init_db(opts.conf_dir.database()).await?;
            enrich(&db, &results, &thresholds).await?
        } else {
            annotate(&results, &thresholds)
        };

        print_result(&matches, self.output_format)
    }
}

fn print_result(result: &[RecognitionMatch], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for m in result {
                match (&m.brand, &m.name) {
                    (Some(brand), Some(name)) => {
                        println!("{:.4}\t{}\t{}\t{} - {}", m.score, m.confidence, m.item_id, brand, name)
                    }
                    _ => println!("{:.4}\t{}\t{}", m.score, m.confidence, m.item_id),
                }
            }
        }
    }
    Ok(())
}
