//! 类型化的远程命令
//!
//! 编排层只构造 [`RemoteCommand`]，直到会话边界才通过 [`RemoteCommand::to_shell`]
//! 转换成具体的shell字符串。所有插值的值都经过单引号转义，测试时可以直接比较
//! 命令本身而不是比较字符串。

use std::fmt;

use serde::{Deserialize, Serialize};

/// systemd服务操作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}

/// 压测工具的来源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StressTool {
    /// 通过系统包安装的 scylla-tools，`cassandra-stress` 位于 PATH 中
    ScyllaTools,
    /// 解压在家目录下的 Apache Cassandra 发行包
    Cassandra { version: String },
}

impl StressTool {
    /// 压测可执行文件路径
    pub fn binary(&self) -> String {
        match self {
            StressTool::ScyllaTools => "cassandra-stress".to_string(),
            StressTool::Cassandra { version } => {
                format!("apache-cassandra-{version}/tools/bin/cassandra-stress")
            }
        }
    }
}

/// 远程命令
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemoteCommand {
    /// `sudo systemctl <action> <unit>`
    Service { action: ServiceAction, unit: String },
    /// `nodetool <args...>`
    Nodetool { args: Vec<String> },
    /// 删除目录下的所有内容，保留目录本身
    ClearDirectory { path: String },
    /// 强制结束指定名称的进程，进程不存在不算失败
    KillAll { process: String },
    /// 运行压测，输出同时追加到远程日志文件
    Stress {
        tool: StressTool,
        args: String,
        log_file: String,
    },
    /// 使用cqlsh执行远程脚本文件
    Cqlsh {
        username: Option<String>,
        password: Option<String>,
        script: String,
    },
    /// 用给定内容覆盖远程文件
    WriteFile { path: String, content: String },
    RemoveFile { path: String },
    /// 以root权限向文件追加一行
    AppendLine { path: String, line: String },
    /// 设置YAML顶层属性，不存在时追加
    SetYamlProperty {
        path: String,
        key: String,
        value: String,
    },
    /// 改写 `seeds:` 配置
    SetSeeds { path: String, seeds: String },
    /// 设置CPU频率调节策略
    SetGovernor { governor: String },
    /// 刷新软件包索引
    UpdatePackages,
    /// 按包管理器安装软件包
    InstallPackages { apt: Vec<String>, yum: Vec<String> },
    /// 安装压测工具
    InstallStressTool { tool: StressTool },
    /// 原样执行的shell命令
    Shell(String),
}

impl RemoteCommand {
    pub fn service(action: ServiceAction, unit: impl Into<String>) -> Self {
        RemoteCommand::Service {
            action,
            unit: unit.into(),
        }
    }

    /// 按空白拆分nodetool子命令
    pub fn nodetool(command: &str) -> Self {
        RemoteCommand::Nodetool {
            args: command.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn clear_directory(path: impl Into<String>) -> Self {
        RemoteCommand::ClearDirectory { path: path.into() }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        RemoteCommand::Shell(command.into())
    }

    /// 命令种类，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteCommand::Service { .. } => "service",
            RemoteCommand::Nodetool { .. } => "nodetool",
            RemoteCommand::ClearDirectory { .. } => "clear_directory",
            RemoteCommand::KillAll { .. } => "kill_all",
            RemoteCommand::Stress { .. } => "stress",
            RemoteCommand::Cqlsh { .. } => "cqlsh",
            RemoteCommand::WriteFile { .. } => "write_file",
            RemoteCommand::RemoveFile { .. } => "remove_file",
            RemoteCommand::AppendLine { .. } => "append_line",
            RemoteCommand::SetYamlProperty { .. } => "set_yaml_property",
            RemoteCommand::SetSeeds { .. } => "set_seeds",
            RemoteCommand::SetGovernor { .. } => "set_governor",
            RemoteCommand::UpdatePackages => "update_packages",
            RemoteCommand::InstallPackages { .. } => "install_packages",
            RemoteCommand::InstallStressTool { .. } => "install_stress_tool",
            RemoteCommand::Shell(_) => "shell",
        }
    }

    /// 转换为远程shell命令
    pub fn to_shell(&self) -> String {
        match self {
            RemoteCommand::Service { action, unit } => {
                format!("sudo systemctl {} {}", action.as_str(), shell_quote(unit))
            }
            RemoteCommand::Nodetool { args } => {
                let mut cmd = String::from("nodetool");
                for arg in args {
                    cmd.push(' ');
                    cmd.push_str(&shell_quote(arg));
                }
                cmd
            }
            RemoteCommand::ClearDirectory { path } => {
                format!("sudo rm -rf {}/*", shell_quote(path.trim_end_matches('/')))
            }
            RemoteCommand::KillAll { process } => {
                format!("killall -q -9 {} || true", shell_quote(process))
            }
            RemoteCommand::Stress {
                tool,
                args,
                log_file,
            } => format!(
                "set -e\nset -o pipefail\n{} {} 2>&1 | tee -a {}\nset +o pipefail",
                tool.binary(),
                args.trim(),
                shell_quote(log_file)
            ),
            RemoteCommand::Cqlsh {
                username,
                password,
                script,
            } => {
                let mut cmd = String::from("cqlsh");
                if let Some(username) = username {
                    cmd.push_str(&format!(" -u {}", shell_quote(username)));
                }
                if let Some(password) = password {
                    cmd.push_str(&format!(" -p {}", shell_quote(password)));
                }
                cmd.push_str(&format!(" -f {}", shell_quote(script)));
                cmd
            }
            RemoteCommand::WriteFile { path, content } => format!(
                "printf '%s\\n' {} > {}",
                shell_quote(content),
                shell_quote(path)
            ),
            RemoteCommand::RemoveFile { path } => format!("rm -f {}", shell_quote(path)),
            RemoteCommand::AppendLine { path, line } => format!(
                "printf '%s\\n' {} | sudo tee -a {} > /dev/null",
                shell_quote(line),
                shell_quote(path)
            ),
            RemoteCommand::SetYamlProperty { path, key, value } => {
                let pattern = format!("^#?[[:space:]]*{}:", sed_escape(key));
                let expr = format!(
                    "s|{}.*|{}: {}|",
                    pattern,
                    sed_escape(key),
                    sed_escape(value)
                );
                let line = format!("{key}: {value}");
                format!(
                    "if sudo grep -qE {pat} {path}; then sudo sed -i -E {expr} {path}; \
                     else printf '%s\\n' {line} | sudo tee -a {path} > /dev/null; fi",
                    pat = shell_quote(&pattern),
                    path = shell_quote(path),
                    expr = shell_quote(&expr),
                    line = shell_quote(&line),
                )
            }
            RemoteCommand::SetSeeds { path, seeds } => {
                let expr = format!("s|seeds:.*|seeds: {} |g", sed_escape(seeds));
                format!("sudo sed -i {} {}", shell_quote(&expr), shell_quote(path))
            }
            RemoteCommand::SetGovernor { governor } => format!(
                "if ls /sys/devices/system/cpu/cpu0/cpufreq/scaling_governor > /dev/null 2>&1; then \
                 printf '%s\\n' {} | sudo tee /sys/devices/system/cpu/cpu*/cpufreq/scaling_governor > /dev/null; fi",
                shell_quote(governor)
            ),
            RemoteCommand::UpdatePackages => concat!(
                "if hash apt-get 2>/dev/null; then sudo apt-get update -y -q; ",
                "elif hash yum 2>/dev/null; then sudo yum makecache -y -q; ",
                "else echo 'apt/yum not found'; exit 1; fi"
            )
            .to_string(),
            RemoteCommand::InstallPackages { apt, yum } => {
                let join = |names: &[String]| {
                    names
                        .iter()
                        .map(|n| shell_quote(n))
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                format!(
                    "if hash apt-get 2>/dev/null; then sudo apt-get install -y -q {}; \
                     elif hash yum 2>/dev/null; then sudo yum install -y -q {}; \
                     else echo 'apt/yum not found'; exit 1; fi",
                    join(apt),
                    join(yum)
                )
            }
            RemoteCommand::InstallStressTool { tool } => match tool {
                StressTool::ScyllaTools => SCYLLA_TOOLS_INSTALL_SCRIPT.to_string(),
                StressTool::Cassandra { version } => {
                    let v = shell_quote(version);
                    format!(
                        "set -e\n\
                         wget -q -N https://archive.apache.org/dist/cassandra/{v}/apache-cassandra-{v}-bin.tar.gz\n\
                         tar -xzf apache-cassandra-{v}-bin.tar.gz"
                    )
                }
            },
            RemoteCommand::Shell(command) => command.clone(),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

const SCYLLA_TOOLS_INSTALL_SCRIPT: &str = r#"set -e
if hash apt-get 2>/dev/null; then
    sudo apt-get install -y apt-transport-https
    sudo apt-key adv --keyserver hkp://keyserver.ubuntu.com:80 --recv-keys 5e08fbd8b5d6ec9c
    sudo curl -L --output /etc/apt/sources.list.d/scylla.list http://downloads.scylladb.com/deb/ubuntu/scylla-4.5-$(lsb_release -s -c).list
    sudo apt-get update -y
    sudo apt-get install -y scylla-tools
elif hash yum 2>/dev/null; then
    sudo yum install -y -q https://dl.fedoraproject.org/pub/epel/epel-release-latest-7.noarch.rpm
    sudo curl -o /etc/yum.repos.d/scylla.repo -L http://downloads.scylladb.com/rpm/centos/scylla-4.5.repo
    sudo yum install -y -q scylla-tools
else
    echo "Cannot install scylla-tools: yum/apt not found"
    exit 1
fi"#;

/// 单引号转义；只包含安全字符的值原样返回
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r#"'\''"#))
    }
}

/// 转义sed替换表达式中的分隔符和特殊字符
fn sed_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '|' | '&') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("scylla-server"), "scylla-server");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_service_command() {
        let cmd = RemoteCommand::service(ServiceAction::Stop, "scylla-server");
        assert_eq!(cmd.to_shell(), "sudo systemctl stop scylla-server");
        assert_eq!(cmd.kind(), "service");
    }

    #[test]
    fn test_nodetool_splits_arguments() {
        let cmd = RemoteCommand::nodetool("flush  keyspace1");
        assert_eq!(
            cmd,
            RemoteCommand::Nodetool {
                args: vec!["flush".to_string(), "keyspace1".to_string()]
            }
        );
        assert_eq!(cmd.to_shell(), "nodetool flush keyspace1");
    }

    #[test]
    fn test_clear_directory_keeps_glob_outside_quotes() {
        let cmd = RemoteCommand::clear_directory("/var/lib/scylla/data/");
        assert_eq!(cmd.to_shell(), "sudo rm -rf /var/lib/scylla/data/*");

        let cmd = RemoteCommand::clear_directory("/tmp/my dir");
        assert_eq!(cmd.to_shell(), "sudo rm -rf '/tmp/my dir'/*");
    }

    #[test]
    fn test_stress_command_uses_pipefail_and_tee() {
        let cmd = RemoteCommand::Stress {
            tool: StressTool::Cassandra {
                version: "4.0.1".to_string(),
            },
            args: "write n=1000 ".to_string(),
            log_file: "cassandra-stress-01-01-2024_10-00-00.log".to_string(),
        };
        let shell = cmd.to_shell();
        assert!(shell.starts_with("set -e\nset -o pipefail\n"));
        assert!(shell.contains(
            "apache-cassandra-4.0.1/tools/bin/cassandra-stress write n=1000 2>&1 | tee -a cassandra-stress-01-01-2024_10-00-00.log"
        ));
        assert!(shell.ends_with("set +o pipefail"));
    }

    #[test]
    fn test_cqlsh_with_credentials() {
        let cmd = RemoteCommand::Cqlsh {
            username: Some("cassandra".to_string()),
            password: Some("p@ss word".to_string()),
            script: "abc.cql".to_string(),
        };
        assert_eq!(cmd.to_shell(), "cqlsh -u cassandra -p 'p@ss word' -f abc.cql");
    }

    #[test]
    fn test_write_file_escapes_quotes() {
        let cmd = RemoteCommand::WriteFile {
            path: "x.cql".to_string(),
            content: "INSERT INTO t (v) VALUES ('a');".to_string(),
        };
        assert_eq!(
            cmd.to_shell(),
            r#"printf '%s\n' 'INSERT INTO t (v) VALUES ('\''a'\'');' > x.cql"#
        );
    }

    #[test]
    fn test_set_seeds() {
        let cmd = RemoteCommand::SetSeeds {
            path: "/etc/scylla/scylla.yaml".to_string(),
            seeds: "10.0.0.1".to_string(),
        };
        assert_eq!(
            cmd.to_shell(),
            "sudo sed -i 's|seeds:.*|seeds: 10.0.0.1 |g' /etc/scylla/scylla.yaml"
        );
    }

    #[test]
    fn test_set_yaml_property_escapes_separator() {
        let cmd = RemoteCommand::SetYamlProperty {
            path: "/etc/scylla/scylla.yaml".to_string(),
            key: "cluster_name".to_string(),
            value: "a|b".to_string(),
        };
        let shell = cmd.to_shell();
        assert!(shell.contains(r"s|^#?[[:space:]]*cluster_name:.*|cluster_name: a\|b|"));
        assert!(shell.contains("tee -a /etc/scylla/scylla.yaml"));
    }

    #[test]
    fn test_kill_all_tolerates_missing_process() {
        let cmd = RemoteCommand::KillAll {
            process: "java".to_string(),
        };
        assert_eq!(cmd.to_shell(), "killall -q -9 java || true");
    }

    #[test]
    fn test_shell_is_verbatim() {
        let cmd = RemoteCommand::shell("echo $HOME | wc -c");
        assert_eq!(cmd.to_shell(), "echo $HOME | wc -c");
        assert_eq!(cmd.to_string(), "echo $HOME | wc -c");
    }
}
