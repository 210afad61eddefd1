//! Minimal class file reader.
//!
//! Only the structural header is decoded: this class, super class,
//! interfaces and the names of declared methods. Field and attribute payloads
//! are skipped without interpretation.

use thiserror::Error;

use crate::error::Result;

const MAGIC: u32 = 0xCAFE_BABE;
const MIN_MAJOR_VERSION: u16 = 45;
const MAX_MAJOR_VERSION: u16 = 69;

#[derive(Debug, Error)]
pub enum ClassFormatError {
    #[error("unexpected end of class file at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("invalid class file magic 0x{found:08X}")]
    InvalidMagic { found: u32 },
    #[error("unsupported class file version {major}")]
    UnsupportedVersion { major: u16 },
    #[error("empty constant pool")]
    EmptyConstantPool,
    #[error("unsupported constant pool tag {tag} at index {index}")]
    UnsupportedConstant { tag: u8, index: usize },
    #[error("two-slot constant at index {index} overflows constant pool of {count}")]
    WideConstantOverflow { index: usize, count: u16 },
    #[error("constant {index} is not a {expected} entry")]
    InvalidConstantIndex { index: u16, expected: &'static str },
    #[error("invalid modified UTF-8 in constant pool")]
    InvalidModifiedUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    /// Dot separated binary name, e.g. `com.acme.Widget$Inner`.
    pub binary_name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    /// Declared method names in class file order, constructors and
    /// synthetic methods included.
    pub methods: Vec<String>,
}

impl ClassHeader {
    pub fn package_name(&self) -> &str {
        match self.binary_name.rfind('.') {
            Some(idx) => &self.binary_name[..idx],
            None => "",
        }
    }

    pub fn simple_name(&self) -> &str {
        match self.binary_name.rfind('.') {
            Some(idx) => &self.binary_name[idx + 1..],
            None => &self.binary_name,
        }
    }
}

#[derive(Debug)]
enum Constant {
    Utf8(String),
    Class(u16),
    Other,
    /// Second slot of a Long or Double entry.
    Unusable,
}

type ParseResult<T> = std::result::Result<T, ClassFormatError>;

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassFormatError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u1(&mut self) -> ParseResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> ParseResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> ParseResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip(&mut self, n: usize) -> ParseResult<()> {
        self.take(n).map(|_| ())
    }
}

pub fn parse_class(bytes: &[u8]) -> Result<ClassHeader> {
    Ok(read_header(bytes)?)
}

fn read_header(bytes: &[u8]) -> ParseResult<ClassHeader> {
    let mut r = ByteReader::new(bytes);

    let magic = r.u4()?;
    if magic != MAGIC {
        return Err(ClassFormatError::InvalidMagic { found: magic });
    }
    let _minor = r.u2()?;
    let major = r.u2()?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major) {
        return Err(ClassFormatError::UnsupportedVersion { major });
    }

    let pool = read_constant_pool(&mut r)?;

    let _access = r.u2()?;
    let this_class = r.u2()?;
    let super_class = r.u2()?;

    let binary_name = class_name(&pool, this_class)?;
    let super_class = if super_class == 0 {
        None
    } else {
        Some(class_name(&pool, super_class)?)
    };

    let interface_count = r.u2()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let idx = r.u2()?;
        interfaces.push(class_name(&pool, idx)?);
    }

    let field_count = r.u2()?;
    for _ in 0..field_count {
        r.skip(6)?;
        skip_attributes(&mut r)?;
    }

    let method_count = r.u2()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        let _access = r.u2()?;
        let name_idx = r.u2()?;
        let _descriptor = r.u2()?;
        methods.push(utf8(&pool, name_idx)?.to_string());
        skip_attributes(&mut r)?;
    }

    Ok(ClassHeader {
        binary_name,
        super_class,
        interfaces,
        methods,
    })
}

fn read_constant_pool(r: &mut ByteReader<'_>) -> ParseResult<Vec<Constant>> {
    let count = r.u2()?;
    if count == 0 {
        return Err(ClassFormatError::EmptyConstantPool);
    }

    // Index 0 is never valid; keep a placeholder so indices line up.
    let mut pool = Vec::with_capacity(count as usize);
    pool.push(Constant::Unusable);

    while pool.len() < count as usize {
        let index = pool.len();
        let tag = r.u1()?;
        match tag {
            1 => {
                let len = r.u2()? as usize;
                let raw = r.take(len)?;
                pool.push(Constant::Utf8(decode_modified_utf8(raw)?));
            }
            7 => pool.push(Constant::Class(r.u2()?)),
            3 | 4 => {
                r.skip(4)?;
                pool.push(Constant::Other);
            }
            5 | 6 => {
                if index + 1 >= count as usize {
                    return Err(ClassFormatError::WideConstantOverflow { index, count });
                }
                r.skip(8)?;
                pool.push(Constant::Other);
                pool.push(Constant::Unusable);
            }
            8 | 16 | 19 | 20 => {
                r.skip(2)?;
                pool.push(Constant::Other);
            }
            9 | 10 | 11 | 12 | 17 | 18 => {
                r.skip(4)?;
                pool.push(Constant::Other);
            }
            15 => {
                r.skip(3)?;
                pool.push(Constant::Other);
            }
            tag => return Err(ClassFormatError::UnsupportedConstant { tag, index }),
        }
    }

    Ok(pool)
}

fn skip_attributes(r: &mut ByteReader<'_>) -> ParseResult<()> {
    let count = r.u2()?;
    for _ in 0..count {
        let _name = r.u2()?;
        let len = r.u4()? as usize;
        r.skip(len)?;
    }
    Ok(())
}

fn utf8(pool: &[Constant], index: u16) -> ParseResult<&str> {
    match pool.get(index as usize) {
        Some(Constant::Utf8(s)) if index != 0 => Ok(s.as_str()),
        _ => Err(ClassFormatError::InvalidConstantIndex {
            index,
            expected: "Utf8",
        }),
    }
}

fn class_name(pool: &[Constant], index: u16) -> ParseResult<String> {
    match pool.get(index as usize) {
        Some(Constant::Class(name_idx)) if index != 0 => {
            Ok(utf8(pool, *name_idx)?.replace('/', "."))
        }
        _ => Err(ClassFormatError::InvalidConstantIndex {
            index,
            expected: "Class",
        }),
    }
}

/// Decodes the JVM's modified UTF-8: NUL is encoded in two bytes and
/// supplementary characters as surrogate pairs of three bytes each.
fn decode_modified_utf8(raw: &[u8]) -> ParseResult<String> {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;
    let bad = || ClassFormatError::InvalidModifiedUtf8;

    while i < raw.len() {
        let b0 = raw[i];
        match b0 {
            0x01..=0x7F => {
                units.push(b0 as u16);
                i += 1;
            }
            0xC0..=0xDF => {
                let b1 = *raw.get(i + 1).ok_or_else(bad)?;
                if b1 & 0xC0 != 0x80 {
                    return Err(bad());
                }
                units.push((((b0 & 0x1F) as u16) << 6) | (b1 & 0x3F) as u16);
                i += 2;
            }
            0xE0..=0xEF => {
                let b1 = *raw.get(i + 1).ok_or_else(bad)?;
                let b2 = *raw.get(i + 2).ok_or_else(bad)?;
                if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                    return Err(bad());
                }
                units.push(
                    (((b0 & 0x0F) as u16) << 12) | (((b1 & 0x3F) as u16) << 6) | (b2 & 0x3F) as u16,
                );
                i += 3;
            }
            _ => return Err(bad()),
        }
    }

    String::from_utf16(&units).map_err(|_| bad())
}

#[cfg(test)]
pub(crate) mod fixture {
    /// Assembles a minimal, valid class file.
    pub(crate) fn class_bytes(
        name: &str,
        super_class: Option<&str>,
        interfaces: &[&str],
        methods: &[&str],
    ) -> Vec<u8> {
        class_bytes_with_constants(name, super_class, interfaces, methods, &[])
    }

    /// Like [`class_bytes`], with raw `(entry, slots)` constants placed at
    /// the front of the pool so every later index shifts.
    pub(crate) fn class_bytes_with_constants(
        name: &str,
        super_class: Option<&str>,
        interfaces: &[&str],
        methods: &[&str],
        leading: &[(Vec<u8>, u16)],
    ) -> Vec<u8> {
        let mut pool: Vec<u8> = Vec::new();
        let mut next: u16 = 1;
        let mut push = |entry: &[u8], slots: u16| -> u16 {
            pool.extend_from_slice(entry);
            let idx = next;
            next += slots;
            idx
        };
        for (entry, slots) in leading {
            push(entry, *slots);
        }
        let mut utf8 = |s: &str| -> u16 {
            let mut e = vec![1u8];
            e.extend_from_slice(&(s.len() as u16).to_be_bytes());
            e.extend_from_slice(s.as_bytes());
            push(&e, 1)
        };
        let n = utf8(&name.replace('.', "/"));
        let super_name = super_class.map(|s| utf8(&s.replace('.', "/")));
        let iface_names: Vec<u16> = interfaces
            .iter()
            .map(|i| utf8(&i.replace('.', "/")))
            .collect();
        let descriptor = utf8("()V");
        let code_attr = utf8("Code");
        let method_idx: Vec<u16> = methods.iter().map(|m| utf8(m)).collect();
        let mut class = |name_idx: u16| -> u16 {
            let mut e = vec![7u8];
            e.extend_from_slice(&name_idx.to_be_bytes());
            push(&e, 1)
        };
        let this_idx = class(n);
        let super_idx = super_name.map(&mut class).unwrap_or(0);
        let iface_idx: Vec<u16> = iface_names.into_iter().map(&mut class).collect();

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&61u16.to_be_bytes());
        out.extend_from_slice(&next.to_be_bytes());
        out.extend_from_slice(&pool);
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&this_idx.to_be_bytes());
        out.extend_from_slice(&super_idx.to_be_bytes());
        out.extend_from_slice(&(iface_idx.len() as u16).to_be_bytes());
        for i in &iface_idx {
            out.extend_from_slice(&i.to_be_bytes());
        }
        // one field with no attributes
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&0x0002u16.to_be_bytes());
        out.extend_from_slice(&descriptor.to_be_bytes());
        out.extend_from_slice(&descriptor.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());

        out.extend_from_slice(&(method_idx.len() as u16).to_be_bytes());
        for m in &method_idx {
            out.extend_from_slice(&0x0001u16.to_be_bytes());
            out.extend_from_slice(&m.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            // one opaque Code attribute
            out.extend_from_slice(&1u16.to_be_bytes());
            out.extend_from_slice(&code_attr.to_be_bytes());
            out.extend_from_slice(&3u32.to_be_bytes());
            out.extend_from_slice(&[0xB1, 0x00, 0x00]);
        }
        // class attributes
        out.extend_from_slice(&0u16.to_be_bytes());
        out
    }

    /// A Long constant (two pool slots).
    pub(crate) fn long_constant(value: i64) -> (Vec<u8>, u16) {
        let mut e = vec![5u8];
        e.extend_from_slice(&value.to_be_bytes());
        (e, 2)
    }
}
