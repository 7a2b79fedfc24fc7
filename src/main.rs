use anyhow::Result;
use clap::Parser;

use jjwxc_fetch::cli::{self, Cli};
use jjwxc_fetch::logger;

// 等待输入时会阻塞当前线程，Ctrl-C 监听需要在其它工作线程上运行
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    logger::init();
    cli::run(Cli::parse()).await
}
