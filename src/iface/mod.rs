//! 接口配置核心
//!
//! 该模块把 `[no] <keyword> <args...>` 形式的配置指令翻译成对内核的控制请求,
//! 并汇总内核状态生成接口状态报告。

pub mod address;
pub mod attrs;
pub mod flags;
pub mod resolver;
pub mod status;
pub mod types;

use crate::platform::ControlChannel;

/// 一次命令独占的控制通道加上已解析的接口名
///
/// drop 时通道随之关闭。
pub struct InterfaceHandle {
    channel: Box<dyn ControlChannel>,
    name: String,
}

impl InterfaceHandle {
    pub fn new(channel: Box<dyn ControlChannel>, name: impl Into<String>) -> Self {
        Self {
            channel,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &dyn ControlChannel {
        self.channel.as_ref()
    }
}

/// A parsed `[no] <keyword> <args...>` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub negate: bool,
    pub keyword: String,
    pub args: Vec<String>,
}

impl Directive {
    pub fn parse<S: AsRef<str>>(words: &[S]) -> Option<Self> {
        let mut words = words.iter().map(|w| w.as_ref());
        let mut keyword = words.next()?;
        let negate = keyword.eq_ignore_ascii_case("no");
        if negate {
            keyword = words.next()?;
        }
        Some(Self {
            negate,
            keyword: keyword.to_ascii_lowercase(),
            args: words.map(str::to_string).collect(),
        })
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }
}
