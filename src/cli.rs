use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use fleetbench_core::TrimPeriods;

use crate::app::{AppCommand, ClusterAction, StressAction};

/// 集群重启或清空后的默认等待时间（秒）
pub const DEFAULT_WAIT_SECONDS: u64 = 90;
const DEFAULT_WAIT_SECONDS_ARG: &str = "90";

/// 构建命令行定义
pub fn build_cli() -> Command {
    Command::new("fleetbench")
        .version(env!("CARGO_PKG_VERSION"))
        .about("数据库集群与压测客户端的批量运维编排工具")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(Command::new("wait-ready").about("等待所有集群节点的端口可用"))
        .subcommand(
            Command::new("cluster")
                .about("管理数据库集群")
                .subcommand_required(true)
                .subcommand(Command::new("install").about("等待首次启动完成后重写节点配置"))
                .subcommand(Command::new("start").about("启动所有节点并等待引导完成"))
                .subcommand(
                    Command::new("stop")
                        .about("排空并停止节点")
                        .arg(node_index_arg())
                        .arg(
                            Arg::new("erase-data")
                                .long("erase-data")
                                .help("停止后清空数据目录")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new("restart")
                        .about("排空后重启集群")
                        .arg(wait_seconds_arg()),
                )
                .subcommand(
                    Command::new("clear")
                        .about("停止集群、删除所有数据后重新启动")
                        .arg(wait_seconds_arg()),
                )
                .subcommand(
                    Command::new("nodetool")
                        .about("执行nodetool命令")
                        .arg(Arg::new("command").required(true).help("nodetool子命令"))
                        .arg(node_index_arg()),
                ),
        )
        .subcommand(
            Command::new("stress")
                .about("管理压测客户端")
                .subcommand_required(true)
                .subcommand(
                    Command::new("prepare").about("清理残留的压测进程").arg(
                        Arg::new("kill-java")
                            .long("kill-java")
                            .help("结束所有java进程")
                            .action(ArgAction::SetTrue),
                    ),
                )
                .subcommand(Command::new("install").about("安装压测工具"))
                .subcommand(
                    Command::new("run")
                        .about("运行压测")
                        .arg(Arg::new("command").required(true).help("压测参数"))
                        .arg(
                            Arg::new("index")
                                .long("index")
                                .value_name("N")
                                .help("只在第N个压测客户端上运行")
                                .value_parser(value_parser!(usize)),
                        )
                        .arg(
                            Arg::new("loop")
                                .long("loop")
                                .help("反复运行，直到收到Ctrl+C")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new("parallel")
                        .about("按分区切分后并行压测")
                        .arg(
                            Arg::new("command")
                                .required(true)
                                .help("压测参数，{start} 和 {end} 被替换为键区间"),
                        )
                        .arg(
                            Arg::new("partitions")
                                .long("partitions")
                                .value_name("COUNT")
                                .required(true)
                                .value_parser(value_parser!(u64)),
                        )
                        .arg(
                            Arg::new("sequence-start")
                                .long("sequence-start")
                                .value_name("KEY")
                                .help("第一个分区键，默认1")
                                .value_parser(value_parser!(i64)),
                        ),
                )
                .subcommand(
                    Command::new("collect")
                        .about("收集压测结果")
                        .arg(
                            Arg::new("dir")
                                .required(true)
                                .value_name("DIR")
                                .value_parser(value_parser!(PathBuf)),
                        )
                        .arg(trim_seconds_arg("warmup-seconds", "汇总时剔除每次压测开头的秒数"))
                        .arg(trim_seconds_arg("cooldown-seconds", "汇总时剔除每次压测结尾的秒数")),
                ),
        )
        .subcommand(
            Command::new("cql")
                .about("在集群节点上执行CQL语句")
                .arg(Arg::new("statement").required(true))
                .arg(
                    Arg::new("node")
                        .long("node")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .default_value("0"),
                )
                .arg(Arg::new("username").long("username").requires("password"))
                .arg(Arg::new("password").long("password").requires("username")),
        )
        .subcommand(
            Command::new("ssh")
                .about("在所有压测客户端上执行shell命令")
                .arg(Arg::new("command").required(true)),
        )
}

fn node_index_arg() -> Arg {
    Arg::new("index")
        .long("index")
        .value_name("N")
        .help("只作用于第N个节点，默认所有节点")
        .value_parser(value_parser!(usize))
}

fn wait_seconds_arg() -> Arg {
    Arg::new("wait-seconds")
        .long("wait-seconds")
        .value_name("SECONDS")
        .help("完成后等待的秒数")
        .value_parser(value_parser!(u64))
        .default_value(DEFAULT_WAIT_SECONDS_ARG)
}

fn trim_seconds_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("SECONDS")
        .help(help)
        .value_parser(value_parser!(u64))
}

/// 把解析结果转换为要执行的操作
pub fn parse_command(matches: &ArgMatches) -> Result<AppCommand> {
    let command = match matches.subcommand() {
        Some(("wait-ready", _)) => AppCommand::WaitReady,
        Some(("cluster", sub)) => AppCommand::Cluster(parse_cluster(sub)?),
        Some(("stress", sub)) => AppCommand::Stress(parse_stress(sub)?),
        Some(("cql", sub)) => AppCommand::Cql {
            statement: required(sub, "statement")?,
            index: sub.get_one::<usize>("node").copied().unwrap_or(0),
            username: sub.get_one::<String>("username").cloned(),
            password: sub.get_one::<String>("password").cloned(),
        },
        Some(("ssh", sub)) => AppCommand::Ssh {
            command: required(sub, "command")?,
        },
        Some((other, _)) => return Err(anyhow!("不支持的命令: {other}")),
        None => return Err(anyhow!("缺少子命令")),
    };
    Ok(command)
}

fn parse_cluster(matches: &ArgMatches) -> Result<ClusterAction> {
    let action = match matches.subcommand() {
        Some(("install", _)) => ClusterAction::Install,
        Some(("start", _)) => ClusterAction::Start,
        Some(("stop", sub)) => ClusterAction::Stop {
            index: sub.get_one::<usize>("index").copied(),
            erase_data: sub.get_flag("erase-data"),
        },
        Some(("restart", sub)) => ClusterAction::Restart {
            wait: wait_seconds(sub),
        },
        Some(("clear", sub)) => ClusterAction::Clear {
            wait: wait_seconds(sub),
        },
        Some(("nodetool", sub)) => ClusterAction::Nodetool {
            command: required(sub, "command")?,
            index: sub.get_one::<usize>("index").copied(),
        },
        Some((other, _)) => return Err(anyhow!("不支持的集群命令: {other}")),
        None => return Err(anyhow!("缺少集群子命令")),
    };
    Ok(action)
}

fn parse_stress(matches: &ArgMatches) -> Result<StressAction> {
    let action = match matches.subcommand() {
        Some(("prepare", sub)) => StressAction::Prepare {
            kill_java: sub.get_flag("kill-java"),
        },
        Some(("install", _)) => StressAction::Install,
        Some(("run", sub)) => StressAction::Run {
            command: required(sub, "command")?,
            load_index: sub.get_one::<usize>("index").copied(),
            repeat: sub.get_flag("loop"),
        },
        Some(("parallel", sub)) => StressAction::Parallel {
            command_fmt: required(sub, "command")?,
            partitions: sub
                .get_one::<u64>("partitions")
                .copied()
                .ok_or_else(|| anyhow!("缺少参数: --partitions"))?,
            sequence_start: sub.get_one::<i64>("sequence-start").copied(),
        },
        Some(("collect", sub)) => StressAction::Collect {
            dir: sub
                .get_one::<PathBuf>("dir")
                .cloned()
                .ok_or_else(|| anyhow!("缺少参数: dir"))?,
            trim: TrimPeriods::new(
                optional_seconds(sub, "warmup-seconds"),
                optional_seconds(sub, "cooldown-seconds"),
            ),
        },
        Some((other, _)) => return Err(anyhow!("不支持的压测命令: {other}")),
        None => return Err(anyhow!("缺少压测子命令")),
    };
    Ok(action)
}

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow!("缺少参数: {name}"))
}

fn wait_seconds(matches: &ArgMatches) -> Duration {
    Duration::from_secs(
        matches
            .get_one::<u64>("wait-seconds")
            .copied()
            .unwrap_or(DEFAULT_WAIT_SECONDS),
    )
}

fn optional_seconds(matches: &ArgMatches, name: &str) -> Option<Duration> {
    matches.get_one::<u64>(name).copied().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppCommand {
        let matches = build_cli().try_get_matches_from(args).unwrap();
        parse_command(&matches).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_parse_cluster_commands() {
        assert_eq!(
            parse(&["fleetbench", "cluster", "restart"]),
            AppCommand::Cluster(ClusterAction::Restart {
                wait: Duration::from_secs(90)
            })
        );
        assert_eq!(
            parse(&["fleetbench", "cluster", "clear", "--wait-seconds", "0"]),
            AppCommand::Cluster(ClusterAction::Clear {
                wait: Duration::ZERO
            })
        );
        assert_eq!(
            parse(&["fleetbench", "cluster", "stop", "--index", "2", "--erase-data"]),
            AppCommand::Cluster(ClusterAction::Stop {
                index: Some(2),
                erase_data: true
            })
        );
    }

    #[test]
    fn test_parse_stress_commands() {
        assert_eq!(
            parse(&["fleetbench", "stress", "run", "write n=100", "--loop"]),
            AppCommand::Stress(StressAction::Run {
                command: "write n=100".to_string(),
                load_index: None,
                repeat: true
            })
        );
        assert_eq!(
            parse(&[
                "fleetbench",
                "stress",
                "parallel",
                "write -pop seq={start}..{end}",
                "--partitions",
                "1000",
            ]),
            AppCommand::Stress(StressAction::Parallel {
                command_fmt: "write -pop seq={start}..{end}".to_string(),
                partitions: 1000,
                sequence_start: None
            })
        );
        assert_eq!(
            parse(&["fleetbench", "stress", "collect", "results"]),
            AppCommand::Stress(StressAction::Collect {
                dir: PathBuf::from("results"),
                trim: TrimPeriods::default()
            })
        );
        assert_eq!(
            parse(&[
                "fleetbench",
                "stress",
                "collect",
                "results",
                "--warmup-seconds",
                "30",
                "--cooldown-seconds",
                "10",
            ]),
            AppCommand::Stress(StressAction::Collect {
                dir: PathBuf::from("results"),
                trim: TrimPeriods::new(Some(Duration::from_secs(30)), Some(Duration::from_secs(10)))
            })
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from([
                "fleetbench",
                "ssh",
                "uptime",
                "--config",
                "fleet.toml",
                "--log-format",
                "json",
            ])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("config").map(String::as_str),
            Some("fleet.toml")
        );
        assert_eq!(
            matches.get_one::<String>("log-format").map(String::as_str),
            Some("json")
        );
        assert_eq!(
            parse_command(&matches).unwrap(),
            AppCommand::Ssh {
                command: "uptime".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_missing_and_invalid_arguments() {
        assert!(build_cli()
            .try_get_matches_from(["fleetbench", "stress", "parallel", "write"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["fleetbench", "cluster", "stop", "--index", "x"])
            .is_err());
        assert!(build_cli()
            .try_get_matches_from(["fleetbench", "cql", "select 1", "--username", "u"])
            .is_err());
    }
}
