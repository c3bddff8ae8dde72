use clap::Parser;
use scentid::Opts;
use scentid::cli::SubCommandExtend;
use scentid::config::SubCommand;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Recognize(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
        SubCommand::Embed(config) => config.run(&opts).await,
        SubCommand::Segment(config) => config.run(&opts).await,
        SubCommand::Inspect(config) => config.run(&opts).await,
        SubCommand::Export(config) => config.run(&opts).await,
        SubCommand::ImportMeta(config) => config.run(&opts).await,
    }
}
