//! Opcodes the bridge itself knows by name.
//!
//! This is not a command catalog. Anything else is passed through by number.

pub const NOP: u16 = 0x0000;
pub const WAIT: u16 = 0x0001;
pub const GOTO: u16 = 0x0002;
pub const GOTO_IF_FALSE: u16 = 0x004d;
pub const TERMINATE_THIS_SCRIPT: u16 = 0x004e;
pub const GOSUB: u16 = 0x0050;
pub const RETURN: u16 = 0x0051;
pub const PRINT_NOW: u16 = 0x00bb;
pub const STORE_SCORE: u16 = 0x010b;

/// Set on the encoded opcode when the condition result is inverted.
pub const NOT_FLAG: u16 = 0x8000;

pub fn name(opcode: u16) -> Option<&'static str> {
    Some(match opcode & !NOT_FLAG {
        NOP => "nop",
        WAIT => "wait",
        GOTO => "goto",
        GOTO_IF_FALSE => "goto_if_false",
        TERMINATE_THIS_SCRIPT => "terminate_this_script",
        GOSUB => "gosub",
        RETURN => "return",
        PRINT_NOW => "print_now",
        STORE_SCORE => "store_score",
        _ => return None,
    })
}

/// Parse `0x00bb`, `00bb` or `187`. Four bare digits are read as hex, the way
/// opcodes are usually written.
pub fn parse(s: &str) -> Option<u16> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u16::from_str_radix(hex, 16).ok();
    }
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_hexdigit()) {
        return u16::from_str_radix(s, 16).ok();
    }
    s.parse().ok()
}
