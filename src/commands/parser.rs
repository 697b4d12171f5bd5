//! CLI 命令行参数解析
//!
//! 使用 clap 定义命令行接口并进行参数解析

use crate::config::DEFAULT_APPS_FILE;
use crate::display::DEFAULT_MAX_DISPLAY_LINES;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// APW - 按应用配置启动子进程并捕获其输出
#[derive(Parser, Debug, Clone)]
#[command(
    name = "apw",
    about = "Launch configured apps with synthesized environments and capture their output",
    version
)]
pub struct Cli {
    /// 日志过滤指令 (trace, debug, info, warn, error 或 EnvFilter 语法)
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// 额外写入日志的文件
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// 应用配置文件
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_APPS_FILE)]
    pub apps: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// 列出配置文件中的应用（无参数时的默认行为）
    List,

    /// 打印某个应用将获得的环境变量
    Env {
        /// 应用名称
        name: String,
    },

    /// 启动应用并转发其输出，直到全部退出或收到 Ctrl-C
    Run {
        /// 要启动的应用名称（为空则启动全部）
        names: Vec<String>,

        /// 不实时转发，仅在结束时打印每个应用的最后几行
        #[arg(long)]
        tail: bool,

        /// 每个应用保留的最大行数
        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_DISPLAY_LINES)]
        lines: usize,
    },
}

impl Cli {
    /// 解析进程参数（失败时由 clap 处理错误输出和退出）
    pub fn parse_args() -> Self {
        Self::parse_args_from(std::env::args_os())
    }

    /// 尝试解析命令行参数（用于测试或自定义 argv）
    pub fn try_parse_args_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Cli::try_parse_from(iter)
    }

    pub fn parse_args_from<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_args_from(iter) {
            Ok(cli) => cli,
            Err(err) => err.exit(),
        }
    }

    /// 最终命令（默认 List）
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::List)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_list() {
        let cli = Cli::try_parse_args_from(["apw"]).unwrap();
        assert_eq!(cli.command(), Commands::List);
        assert_eq!(cli.apps, PathBuf::from(DEFAULT_APPS_FILE));
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn run_collects_names_and_options() {
        let cli = Cli::try_parse_args_from([
            "apw", "run", "alpha", "beta", "--tail", "--lines", "5", "--apps", "/tmp/apps.json",
        ])
        .unwrap();
        assert_eq!(
            cli.command(),
            Commands::Run {
                names: vec!["alpha".to_string(), "beta".to_string()],
                tail: true,
                lines: 5,
            }
        );
        assert_eq!(cli.apps, PathBuf::from("/tmp/apps.json"));
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_args_from(["apw", "run"]).unwrap();
        assert_eq!(
            cli.command(),
            Commands::Run {
                names: Vec::new(),
                tail: false,
                lines: DEFAULT_MAX_DISPLAY_LINES,
            }
        );
    }

    #[test]
    fn global_logging_flags_after_subcommand() {
        let cli =
            Cli::try_parse_args_from(["apw", "env", "alpha", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(
            cli.command(),
            Commands::Env {
                name: "alpha".to_string()
            }
        );
    }

    #[test]
    fn env_requires_a_name() {
        assert!(Cli::try_parse_args_from(["apw", "env"]).is_err());
    }
}
