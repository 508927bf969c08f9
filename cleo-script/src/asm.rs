//! Assembly and disassembly of single SCM instructions.
//!
//! Layout: a little-endian `u16` opcode (bit 15 inverts the condition result)
//! followed by each argument as a type byte plus payload. Variadic argument
//! lists end with a `0x00` type byte.

use std::fmt;
use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::WINDOWS_1252;

use crate::error::AsmError;
use crate::gate::Arg;
use crate::opcode;
use crate::value::Value;
use crate::var::{Scope, VarHandle};

pub const TYPE_END: u8 = 0x00;
pub const TYPE_INT32: u8 = 0x01;
pub const TYPE_GLOBAL_VAR: u8 = 0x02;
pub const TYPE_LOCAL_VAR: u8 = 0x03;
pub const TYPE_INT8: u8 = 0x04;
pub const TYPE_INT16: u8 = 0x05;
pub const TYPE_REAL: u8 = 0x06;
pub const TYPE_TEXT8: u8 = 0x09;
pub const TYPE_TEXT_VAR_LEN: u8 = 0x0e;
pub const TYPE_TEXT16: u8 = 0x0f;

/// How many arguments to read for an opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Read until the `0x00` terminator.
    Variadic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    pub opcode: u16,
    /// Byte offset the instruction was read from; zero for freshly built ones.
    pub offset: u64,
    pub not: bool,
    pub args: Vec<Arg>,
}

impl Instr {
    pub fn new(opcode: u16, args: Vec<Arg>) -> Self {
        Self {
            opcode: opcode & !opcode::NOT_FLAG,
            offset: 0,
            not: opcode & opcode::NOT_FLAG != 0,
            args,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.not = !self.not;
        self
    }

    pub fn name(&self) -> Option<&'static str> {
        opcode::name(self.opcode)
    }

    /// Encode into `dest`. Returns the number of bytes written.
    pub fn write(&self, dest: &mut impl Write) -> Result<usize, AsmError> {
        let encoded = self.opcode | if self.not { opcode::NOT_FLAG } else { 0 };
        dest.write_u16::<LittleEndian>(encoded)?;

        let mut byte_count = 2;
        for arg in &self.args {
            byte_count += write_arg(arg, dest)?;
        }

        Ok(byte_count)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AsmError> {
        let mut buf = Vec::with_capacity(2 + self.args.len() * 5);
        self.write(&mut buf)?;
        Ok(buf)
    }

    pub fn read(reader: &mut Cursor<&[u8]>, arity: Arity) -> Result<Instr, AsmError> {
        let offset = reader.position();
        let raw = reader.read_u16::<LittleEndian>()?;

        let mut args = Vec::new();
        match arity {
            Arity::Fixed(n) => {
                args.reserve(n);
                for _ in 0..n {
                    let id = reader.read_u8()?;
                    args.push(read_arg(id, reader)?);
                }
            }
            Arity::Variadic => loop {
                let id = reader.read_u8()?;
                if id == TYPE_END {
                    break;
                }
                args.push(read_arg(id, reader)?);
            },
        }

        let mut instr = Instr::new(raw, args);
        instr.offset = offset;
        Ok(instr)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .args
            .iter()
            .map(Arg::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{:08x} {:04x} {}{}({})",
            self.offset,
            self.opcode,
            if self.not { "!" } else { "" },
            self.name().unwrap_or("<no name>"),
            args
        )
    }
}

/// Read instructions back to back until `bytes` runs out.
///
/// `arity_of` supplies the argument shape for each opcode; an opcode it does not
/// know stops disassembly with [`AsmError::UnknownOpcode`].
pub fn disassemble(
    bytes: &[u8],
    arity_of: impl Fn(u16) -> Option<Arity>,
) -> Result<Vec<Instr>, AsmError> {
    let mut reader = Cursor::new(bytes);
    let mut out = Vec::new();

    while (reader.position() as usize) < bytes.len() {
        let offset = reader.position();
        let raw = reader.read_u16::<LittleEndian>()?;
        let op = raw & !opcode::NOT_FLAG;
        let arity = arity_of(op).ok_or(AsmError::UnknownOpcode { opcode: op, offset })?;

        reader.set_position(offset);
        out.push(Instr::read(&mut reader, arity)?);
    }

    Ok(out)
}

/// Encode one argument. Returns the number of bytes written.
pub fn write_arg(arg: &Arg, dest: &mut impl Write) -> Result<usize, AsmError> {
    Ok(match arg {
        Arg::Value(Value::Int(v)) => {
            dest.write_u8(TYPE_INT32)?;
            dest.write_i32::<LittleEndian>(*v)?;
            5
        }
        Arg::Value(Value::Real(v)) => {
            dest.write_u8(TYPE_REAL)?;
            dest.write_f32::<LittleEndian>(*v)?;
            5
        }
        Arg::Value(Value::Text(s)) => {
            let bytes = encode_text(s)?;
            dest.write_u8(TYPE_TEXT_VAR_LEN)?;
            dest.write_u8(bytes.len() as u8)?;
            dest.write_all(&bytes)?;
            bytes.len() + 2
        }
        Arg::Var(var) => {
            // The game doesn't check variable types, so a slot holding text is
            // addressed exactly like a numeric one.
            let index = u16::try_from(var.index()).map_err(|_| AsmError::IndexTooLarge(*var))?;
            dest.write_u8(match var.scope() {
                Scope::Global => TYPE_GLOBAL_VAR,
                Scope::Local => TYPE_LOCAL_VAR,
            })?;
            dest.write_u16::<LittleEndian>(index)?;
            3
        }
    })
}

fn read_arg(id: u8, reader: &mut impl Read) -> Result<Arg, AsmError> {
    Ok(match id {
        TYPE_INT32 => Arg::Value(Value::Int(reader.read_i32::<LittleEndian>()?)),
        TYPE_INT8 => Arg::Value(Value::Int(i32::from(reader.read_i8()?))),
        TYPE_INT16 => Arg::Value(Value::Int(i32::from(reader.read_i16::<LittleEndian>()?))),
        TYPE_REAL => Arg::Value(Value::Real(reader.read_f32::<LittleEndian>()?)),
        TYPE_GLOBAL_VAR | 0x0a | 0x10 => Arg::Var(VarHandle::new(
            Scope::Global,
            u32::from(reader.read_u16::<LittleEndian>()?),
        )),
        TYPE_LOCAL_VAR | 0x0b | 0x11 => Arg::Var(VarHandle::new(
            Scope::Local,
            u32::from(reader.read_u16::<LittleEndian>()?),
        )),
        TYPE_TEXT8 => Arg::Value(Value::Text(read_fixed_text::<8>(reader)?)),
        TYPE_TEXT16 => Arg::Value(Value::Text(read_fixed_text::<16>(reader)?)),
        TYPE_TEXT_VAR_LEN => {
            let len = reader.read_u8()? as usize;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            Arg::Value(Value::Text(decode_text(&buf)))
        }
        // Array element references.
        0x07 | 0x08 | 0x0c | 0x0d | 0x12 | 0x13 => return Err(AsmError::Unsupported(id)),
        _ => return Err(AsmError::UnknownType(id)),
    })
}

fn read_fixed_text<const N: usize>(reader: &mut impl Read) -> io::Result<String> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(decode_text(&buf))
}

fn encode_text(s: &str) -> Result<Vec<u8>, AsmError> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(s);
    if had_errors {
        return Err(AsmError::Unmappable(s.to_string()));
    }
    if bytes.len() > u8::MAX as usize {
        return Err(AsmError::TextTooLong { len: bytes.len() });
    }
    Ok(bytes.into_owned())
}

/// Decode up to the first NUL.
fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    WINDOWS_1252
        .decode_without_bom_handling(&bytes[..end])
        .0
        .into_owned()
}

/// Space-separated hex dump, used for trace logging of assembled code.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
