use anyhow::{bail, Context, Result};
use cleo_script::{Arg, Value, VarHandle};

/// Parse one command-line operand.
///
/// `i:3000`, `f:1.5`, `s:JS_MSG`, `l:10` (local var) and `g:0x10` (global var).
/// A bare number is an int, or a real if it has a decimal point.
pub fn parse_operand(s: &str) -> Result<Arg> {
    let Some((tag, body)) = s.split_once(':') else {
        return parse_bare(s);
    };

    Ok(match tag {
        "i" => Arg::Value(Value::Int(parse_int(body)?)),
        "f" => Arg::Value(Value::Real(
            body.parse::<f32>()
                .with_context(|| format!("invalid real operand {s:?}"))?,
        )),
        "s" => Arg::Value(Value::from(body)),
        "l" => Arg::Var(VarHandle::local(parse_index(body)?)?),
        "g" => Arg::Var(VarHandle::global(parse_index(body)?)?),
        _ => bail!("unknown operand tag {tag:?} in {s:?}"),
    })
}

fn parse_bare(s: &str) -> Result<Arg> {
    if s.contains('.') {
        let v: f32 = s.parse().with_context(|| format!("invalid real operand {s:?}"))?;
        return Ok(Arg::Value(Value::Real(v)));
    }
    Ok(Arg::Value(Value::Int(parse_int(s)?)))
}

fn parse_int(s: &str) -> Result<i32> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .with_context(|| format!("invalid int operand {s:?}"))?;

    let v = if neg { -magnitude } else { magnitude };
    i32::try_from(v).with_context(|| format!("int operand {s:?} out of range"))
}

fn parse_index(s: &str) -> Result<i64> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("invalid variable index {s:?}"))
}

/// Accepts `01 00 04 0a` as well as `0100040a`.
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte {:?}", &digits[i..i + 2]))
        })
        .collect()
}
