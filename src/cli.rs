use serde::Deserialize;
use clap::Parser;
use std::collections::BTreeMap;
use std::fs;
use crate::error::{IfshError, Result};
use crate::iface::types::DEFAULT_POWERSAVE_MS;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<String>,

    /// 从文件读取命令并执行, 然后退出
    #[arg(short = 'i', long)]
    pub rcfile: Option<String>,

    /// 显示详细的接口状态
    #[arg(short, long)]
    pub verbose: bool,

    /// 日志级别
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// 单条命令, 例如 `show interface em0`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub verbose: bool,

    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `powersave` 不带参数时使用的超时
    #[serde(default = "default_powersave_timeout")]
    pub powersave_timeout_ms: u32,

    /// `no mtu` 恢复的 MTU, 按接口类型名覆盖内置默认值
    #[serde(default)]
    pub mtu_defaults: BTreeMap<String, u32>,
}

// 默认日志级别
fn default_log_level() -> String {
    "warn".to_string()
}

fn default_powersave_timeout() -> u32 {
    DEFAULT_POWERSAVE_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            log_level: default_log_level(),
            powersave_timeout_ms: default_powersave_timeout(),
            mtu_defaults: BTreeMap::new(),
        }
    }
}

impl Config {
    /// 从 YAML 文件加载配置
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.powersave_timeout_ms == 0 {
            return Err(IfshError::Config("invalid powersave timeout".to_string()));
        }
        if let Some((label, _)) = self.mtu_defaults.iter().find(|(_, mtu)| **mtu == 0) {
            return Err(IfshError::Config(format!("invalid default mtu for {}", label)));
        }
        Ok(())
    }
}
