//! 接口标志位控制
//!
//! 每次修改都是"读取最新值 -> 本地改位 -> 整体写回", 不与旧状态做增量比较。

use log::debug;

use super::types::InterfaceFlags;
use super::{Directive, InterfaceHandle};
use crate::error::{IfshError, Result};

/// How an enabled attribute is stored in the flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// bit set means enabled
    Direct,
    /// bit cleared means enabled
    Inverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    Set,
    Clear,
}

impl BitOp {
    pub fn apply(self, flags: InterfaceFlags, bits: InterfaceFlags) -> InterfaceFlags {
        match self {
            BitOp::Set => flags | bits,
            BitOp::Clear => flags - bits,
        }
    }
}

/// Translate the negation marker into a bit operation for an attribute of
/// the given polarity.
pub fn bit_op(polarity: Polarity, negate: bool) -> BitOp {
    match (polarity, negate) {
        (Polarity::Direct, false) | (Polarity::Inverted, true) => BitOp::Set,
        (Polarity::Direct, true) | (Polarity::Inverted, false) => BitOp::Clear,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagAttribute {
    pub keyword: &'static str,
    pub bit: InterfaceFlags,
    pub polarity: Polarity,
}

pub const FLAG_ATTRIBUTES: [FlagAttribute; 3] = [
    FlagAttribute {
        keyword: "debug",
        bit: InterfaceFlags::DEBUG,
        polarity: Polarity::Direct,
    },
    // `shutdown` 与 UP 相反
    FlagAttribute {
        keyword: "shutdown",
        bit: InterfaceFlags::UP,
        polarity: Polarity::Inverted,
    },
    FlagAttribute {
        keyword: "arp",
        bit: InterfaceFlags::NOARP,
        polarity: Polarity::Inverted,
    },
];

pub fn attribute(keyword: &str) -> Option<&'static FlagAttribute> {
    FLAG_ATTRIBUTES
        .iter()
        .find(|attr| attr.keyword.eq_ignore_ascii_case(keyword))
}

pub fn get(handle: &InterfaceHandle) -> Result<InterfaceFlags> {
    debug!("{}: get flags", handle.name());
    handle.channel().flags(handle.name())
}

pub fn set(handle: &InterfaceHandle, flags: InterfaceFlags) -> Result<()> {
    debug!("{}: set flags {}", handle.name(), flags.describe());
    handle.channel().set_flags(handle.name(), flags)
}

/// get + modify + set, as one unit of work.
pub fn modify<F>(handle: &InterfaceHandle, f: F) -> Result<()>
where
    F: FnOnce(InterfaceFlags) -> InterfaceFlags,
{
    let current = get(handle)?;
    set(handle, f(current))
}

/// `debug`, `shutdown`, `arp` and their negations.
pub fn set_attribute(
    handle: &InterfaceHandle,
    attr: &FlagAttribute,
    directive: &Directive,
) -> Result<()> {
    if directive.arg_count() > 0 {
        let negated = format!("no {}", attr.keyword);
        return Err(IfshError::usage(&[attr.keyword, &negated]));
    }
    let op = bit_op(attr.polarity, directive.negate);
    modify(handle, |flags| op.apply(flags, attr.bit))
}

fn link_bit(arg: &str) -> Result<InterfaceFlags> {
    match arg {
        "0" => Ok(InterfaceFlags::LINK0),
        "1" => Ok(InterfaceFlags::LINK1),
        "2" => Ok(InterfaceFlags::LINK2),
        _ => Err(IfshError::Validation(format!("Invalid argument: {}", arg))),
    }
}

/// `link <012>` / `no link [012]`
pub fn set_link(handle: &InterfaceHandle, directive: &Directive) -> Result<()> {
    let argc = directive.arg_count();
    if (!directive.negate && argc < 1) || argc > 3 {
        return Err(IfshError::usage(&["link <012>", "no link [012]"]));
    }

    let bits = if argc == 0 {
        InterfaceFlags::LINK_MODES
    } else {
        directive
            .args
            .iter()
            .map(|arg| link_bit(arg))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .fold(InterfaceFlags::empty(), |acc, bit| acc | bit)
    };

    let op = bit_op(Polarity::Direct, directive.negate);
    modify(handle, |flags| op.apply(flags, bits))
}
