use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::crawler::{ChapterSource, JjwxcCrawler, SearchSource};
use crate::download::{DownloadReport, DownloadRequest};
use crate::search::{CrawlMode, CrawlOutcome};
use crate::session::{Session, SessionEvent};
use crate::utils::{display_elapsed_time, get_user_input};

const DEFAULT_MAX_NOVELS: u32 = 50;

#[derive(Debug, Parser)]
#[command(name = "jjwxc-fetch", version, about = "按关键词搜索晋江文学城小说并下载章节")]
pub struct Cli {
    /// 配置文件，默认读取当前目录下的 jjwxc-fetch.toml（可不存在）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 保存目录，覆盖配置文件中的 save_path
    #[arg(long, global = true)]
    pub save_path: Option<PathBuf>,

    /// 结束时把全部日志导出到该文件
    #[arg(long, global = true)]
    pub export_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 搜索小说并列出结果
    Search {
        keyword: String,
        /// 最多获取的小说数量
        #[arg(long, default_value_t = DEFAULT_MAX_NOVELS, value_parser = clap::value_parser!(u32).range(1..))]
        max: u32,
        /// 一直爬取到连续3页为空
        #[arg(long, conflicts_with = "max")]
        until_fail: bool,
    },
    /// 下载指定小说的章节
    Download {
        #[arg(long)]
        novel_id: String,
        /// 小说名，用作保存目录名
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 1)]
        start: u32,
        /// 结束章节，0 表示下载到最后一章
        #[arg(long, default_value_t = 0)]
        end: u32,
    },
    /// 交互模式（默认）
    Interactive,
}

pub fn crawl_mode(max: u32, until_fail: bool) -> CrawlMode {
    if until_fail {
        CrawlMode::UntilFail
    } else {
        CrawlMode::Bounded { max: max as usize }
    }
}

/// 交互模式下的数量输入：留空为默认值，`all` 表示爬取直到失败
pub fn parse_crawl_mode(input: &str) -> Result<CrawlMode> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(crawl_mode(DEFAULT_MAX_NOVELS, false));
    }
    if input.eq_ignore_ascii_case("all") {
        return Ok(CrawlMode::UntilFail);
    }
    let max: u32 = input
        .parse()
        .map_err(|_| anyhow::anyhow!("爬取数量必须是数字！"))?;
    if max < 1 {
        anyhow::bail!("爬取数量必须大于0！");
    }
    Ok(crawl_mode(max, false))
}

pub fn parse_chapter(input: &str, default: u32) -> Result<u32> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(default);
    }
    input
        .parse()
        .map_err(|_| anyhow::anyhow!("章节必须是数字！"))
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(save_path) = cli.save_path {
        config.save_path = save_path;
    }

    let crawler = Arc::new(JjwxcCrawler::new(&config.site)?);
    let mut session = Session::new(crawler, config);
    let mut interrupts = Interrupts::listen();

    let result = match cli.command.unwrap_or(Command::Interactive) {
        Command::Search {
            keyword,
            max,
            until_fail,
        } => run_search(
            &mut session,
            &mut interrupts,
            keyword,
            crawl_mode(max, until_fail),
        )
            .await
            .map(|_| ()),
        Command::Download {
            novel_id,
            name,
            start,
            end,
        } => {
            let request = DownloadRequest {
                novel_id,
                novel_name: name,
                start_chapter: start,
                end_chapter: end,
            };
            run_download(&mut session, &mut interrupts, request)
                .await
                .map(|_| ())
        }
        Command::Interactive => interactive(&mut session, &mut interrupts).await,
    };

    if let Some(path) = &cli.export_log {
        session.export_log(path).await?;
    }
    session.shutdown().await;
    result
}

async fn run_search<S>(
    session: &mut Session<S>,
    interrupts: &mut Interrupts,
    keyword: String,
    mode: CrawlMode,
) -> Result<Option<CrawlOutcome>>
where
    S: SearchSource + ChapterSource + 'static,
{
    let keyword = keyword.trim().to_owned();
    if keyword.is_empty() {
        anyhow::bail!("请输入搜索关键词！");
    }

    let started = Instant::now();
    let job = session.start_crawl(keyword, mode);
    let outcome = pump(session, interrupts, |event| match event {
        SessionEvent::CrawlFinished { job: id, outcome } if id == job => Some(outcome),
        _ => None,
    })
    .await;
    display_elapsed_time(started.elapsed());

    if let Some(outcome) = &outcome {
        println!();
        for (line, novel) in session.listing().iter().zip(session.results()) {
            println!("{}  (ID: {})  {}", line, novel.id, novel.link);
        }
        println!("共获取到 {} 本小说", outcome.results.len());
    }
    Ok(outcome)
}

async fn run_download<S>(
    session: &mut Session<S>,
    interrupts: &mut Interrupts,
    request: DownloadRequest,
) -> Result<DownloadReport>
where
    S: SearchSource + ChapterSource + 'static,
{
    let started = Instant::now();
    let novel_name = request.novel_name.clone();
    let job = session.start_download(request);
    let report = pump(session, interrupts, |event| match event {
        SessionEvent::DownloadFinished { job: id, report } if id == job => Some(report),
        _ => None,
    })
    .await
    .ok_or_else(|| anyhow::anyhow!("下载任务意外结束"))??;
    display_elapsed_time(started.elapsed());

    println!(
        "\n《{}》下载完成！\n共下载 {} 章\n保存路径：{}",
        novel_name,
        report.total,
        report.save_dir.display()
    );
    Ok(report)
}

async fn interactive<S>(session: &mut Session<S>, interrupts: &mut Interrupts) -> Result<()>
where
    S: SearchSource + ChapterSource + 'static,
{
    loop {
        println!("\n=== jjwxc-fetch ===");
        let keyword = get_user_input("请输入搜索关键词: ")?;
        if keyword.is_empty() {
            println!("请输入搜索关键词！");
            continue;
        }

        let mode = match parse_crawl_mode(&get_user_input(
            "最大爬取数量（默认50，输入 all 爬取直到失败）: ",
        )?) {
            Ok(mode) => mode,
            Err(e) => {
                println!("输入错误: {}", e);
                continue;
            }
        };

        run_search(session, interrupts, keyword, mode).await?;

        if !session.results().is_empty() {
            let choice = get_user_input("\n请输入要下载的小说序号（留空跳过）: ")?;
            if !choice.is_empty() {
                let selected = choice
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| session.select(n))
                    .cloned();
                match selected {
                    Some(novel) => {
                        let range = parse_chapter(&get_user_input("开始章节（默认1）: ")?, 1)
                            .and_then(|start| {
                                let end = parse_chapter(
                                    &get_user_input("结束章节（留空下载全部）: ")?,
                                    0,
                                )?;
                                Ok((start, end))
                            });
                        match range {
                            Ok((start, end)) => {
                                let request = DownloadRequest::for_result(&novel, start, end);
                                if let Err(e) = run_download(session, interrupts, request).await {
                                    println!("下载失败: {}", e);
                                }
                            }
                            Err(e) => println!("输入错误: {}", e),
                        }
                    }
                    None => println!("序号无效: {}", choice),
                }
            }
        }

        let again = get_user_input("\n是否继续? (y/n): ")?;
        if !again.eq_ignore_ascii_case("y") {
            break;
        }
    }

    println!("程序结束。");
    Ok(())
}

enum Wake {
    Event(Option<SessionEvent>),
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    /// 有任务在运行：取消任务，回到提示
    Cancel,
    /// 没有任务：直接退出程序
    Exit,
}

/// 发送端：由 Ctrl-C 监听任务持有
#[derive(Clone)]
struct InterruptTrigger {
    busy: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<()>,
}

impl InterruptTrigger {
    fn raise(&self) -> InterruptAction {
        if self.busy.load(Ordering::SeqCst) && self.tx.send(()).is_ok() {
            InterruptAction::Cancel
        } else {
            InterruptAction::Exit
        }
    }
}

/// 进程级的 Ctrl-C 处理：任务运行时取消任务，等待输入时退出程序
struct Interrupts {
    trigger: InterruptTrigger,
    rx: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            trigger: InterruptTrigger {
                busy: Arc::new(AtomicBool::new(false)),
                tx,
            },
            rx,
        }
    }

    /// 在后台监听 Ctrl-C，整个进程只注册一次
    fn listen() -> Self {
        let interrupts = Self::new();
        let trigger = interrupts.trigger.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if trigger.raise() == InterruptAction::Exit {
                    println!("\n程序结束。");
                    std::process::exit(130);
                }
            }
        });
        interrupts
    }

    /// 标记有任务在运行，返回值离开作用域时清除标记；之前残留的中断信号会被丢弃
    fn enter(&mut self) -> BusyGuard {
        while self.rx.try_recv().is_ok() {}
        self.trigger.busy.store(true, Ordering::SeqCst);
        BusyGuard(Arc::clone(&self.trigger.busy))
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 打印日志直到 `finished` 返回结果；每次 Ctrl-C 都会取消正在进行的任务
async fn pump<S, T>(
    session: &mut Session<S>,
    interrupts: &mut Interrupts,
    mut finished: impl FnMut(SessionEvent) -> Option<T>,
) -> Option<T>
where
    S: SearchSource + ChapterSource + 'static,
{
    let _busy = interrupts.enter();

    loop {
        let wake = tokio::select! {
            event = session.next_event() => Wake::Event(event),
            Some(()) = interrupts.rx.recv() => Wake::Interrupt,
        };

        match wake {
            Wake::Interrupt => {
                println!("\n收到中断信号，正在停止当前任务...");
                session.cancel_all();
            }
            Wake::Event(None) => return None,
            Wake::Event(Some(SessionEvent::Log(line))) => println!("{}", line),
            Wake::Event(Some(event)) => {
                if let Some(done) = finished(event) {
                    return Some(done);
                }
            }
        }
    }
}
