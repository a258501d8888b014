/*
 * Created on Mon Mar 25 2024
 *
 * This file is a part of Basalt
 * Basalt is a free and open-source in-memory key/value datastore written
 * by Sayan Nandan ("the Author") with the vision to provide a lean,
 * predictable and memory-efficient foundation for structured data
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

/*
    Text-facing appenders for the byte string: the directive-driven fast path
    (no `core::fmt` anywhere on it), the general `fmt::Write` bridge, the
    quoted/escaped representation, and the tokenizer that parses that
    representation back.
*/

use {
    super::Dbs,
    crate::error::{CoreError, CoreResult},
    core::fmt as cfmt,
};

const DEC_DIGITS_LUT: &[u8] = b"\
      0001020304050607080910111213141516171819\
      2021222324252627282930313233343536373839\
      4041424344454647484950515253545556575859\
      6061626364656667686970717273747576777879\
      8081828384858687888990919293949596979899";

/// Reusable digit buffer; big enough for `i64::MIN` with its sign. Digits go
/// in back to front, two per lookup
pub(super) struct IntBuf {
    b: [u8; 21],
}

impl IntBuf {
    pub fn new() -> Self {
        Self { b: [0u8; 21] }
    }
    fn put_u64(&mut self, mut v: u64) -> usize {
        let mut i = self.b.len();
        while v >= 100 {
            let d = ((v % 100) as usize) << 1;
            v /= 100;
            i -= 2;
            self.b[i] = DEC_DIGITS_LUT[d];
            self.b[i + 1] = DEC_DIGITS_LUT[d + 1];
        }
        if v >= 10 {
            let d = (v as usize) << 1;
            i -= 2;
            self.b[i] = DEC_DIGITS_LUT[d];
            self.b[i + 1] = DEC_DIGITS_LUT[d + 1];
        } else {
            i -= 1;
            self.b[i] = b'0' + v as u8;
        }
        i
    }
    pub fn write_u64(&mut self, v: u64) -> &[u8] {
        let i = self.put_u64(v);
        &self.b[i..]
    }
    pub fn write_i64(&mut self, v: i64) -> &[u8] {
        let neg = v < 0;
        let mag = if neg {
            // two's complement magnitude; in-range even for i64::MIN
            (!(v as u64)).wrapping_add(1)
        } else {
            v as u64
        };
        let mut i = self.put_u64(mag);
        if neg {
            i -= 1;
            self.b[i] = b'-';
        }
        &self.b[i..]
    }
}

/// A typed argument for [`Dbs::cat_printf`]. One enum covers both integer
/// widths of each signedness: the directive pairs `%i`/`%I` and `%u`/`%U`
/// accept the same variant
#[derive(Debug, Clone, Copy)]
pub enum FmtArg<'a> {
    Str(&'a [u8]),
    Dbs(&'a Dbs),
    SInt(i64),
    UInt(u64),
}

impl Dbs {
    /// Directive-driven append: `%s` (byte string), `%S` (another [`Dbs`]),
    /// `%i`/`%I` (signed), `%u`/`%U` (unsigned), `%%` (literal percent). An
    /// unknown directive byte is emitted verbatim. Handing the wrong argument
    /// kind (or the wrong count) is API misuse and aborts.
    ///
    /// Supported directives never touch `core::fmt`; for everything else there
    /// is [`Self::cat_fmt`]
    pub fn cat_printf(&mut self, fmt: &[u8], args: &[FmtArg]) -> CoreResult<()> {
        let mut args = args.iter();
        let mut ib = IntBuf::new();
        let mut i = 0;
        while i < fmt.len() {
            if fmt[i] != b'%' {
                let start = i;
                while i < fmt.len() && fmt[i] != b'%' {
                    i += 1;
                }
                self.append(&fmt[start..i])?;
                continue;
            }
            if i + 1 == fmt.len() {
                // lone trailing percent
                self.append(b"%")?;
                break;
            }
            match fmt[i + 1] {
                b's' => match args.next() {
                    Some(FmtArg::Str(s)) => self.append(s)?,
                    _ => panic!("%s expects a byte-string argument"),
                },
                b'S' => match args.next() {
                    Some(FmtArg::Dbs(s)) => self.append(s.as_slice())?,
                    _ => panic!("%S expects a dynamic-string argument"),
                },
                b'i' | b'I' => match args.next() {
                    Some(FmtArg::SInt(v)) => {
                        let r = ib.write_i64(*v);
                        self.append(r)?
                    }
                    _ => panic!("%i expects a signed-integer argument"),
                },
                b'u' | b'U' => match args.next() {
                    Some(FmtArg::UInt(v)) => {
                        let r = ib.write_u64(*v);
                        self.append(r)?
                    }
                    _ => panic!("%u expects an unsigned-integer argument"),
                },
                b'%' => self.append(b"%")?,
                other => self.append(&[other])?,
            }
            i += 2;
        }
        assert!(args.next().is_none(), "unconsumed format arguments");
        Ok(())
    }
    /// General formatted append through the standard machinery. Allocation
    /// failure comes back as [`CoreError::OutOfMemory`] (the formatter's
    /// opaque error has exactly one source here)
    pub fn cat_fmt(&mut self, args: cfmt::Arguments) -> CoreResult<()> {
        cfmt::write(self, args).map_err(|_| CoreError::OutOfMemory)
    }
    /// Append a double-quoted, escaped rendering of `d` that
    /// [`Self::split_args`] parses back to the original bytes
    pub fn cat_repr(&mut self, d: &[u8]) -> CoreResult<()> {
        self.append(b"\"")?;
        for &b in d {
            match b {
                b'\\' | b'"' => self.append(&[b'\\', b])?,
                b'\n' => self.append(b"\\n")?,
                b'\r' => self.append(b"\\r")?,
                b'\t' => self.append(b"\\t")?,
                0x07 => self.append(b"\\a")?,
                0x08 => self.append(b"\\b")?,
                0x20..=0x7e => self.append(&[b])?,
                _ => {
                    const HEX: &[u8; 16] = b"0123456789abcdef";
                    self.append(&[b'\\', b'x', HEX[(b >> 4) as usize], HEX[(b & 15) as usize]])?
                }
            }
        }
        self.append(b"\"")
    }
    /// Split a command line into tokens the way an interactive shell would:
    /// double-quoted strings honor `\n \r \t \a \b \xHH` (and pass any other
    /// escaped byte through), single-quoted strings are literal except for
    /// `\'`, and a closing quote must run into whitespace or the end of input.
    /// Unbalanced quoting fails; empty input is zero tokens, not a failure
    pub fn split_args(line: &[u8]) -> CoreResult<Vec<Dbs>> {
        let mut argv = Vec::new();
        let mut i = 0;
        loop {
            while i < line.len() && line[i].is_ascii_whitespace() {
                i += 1;
            }
            if i == line.len() {
                return Ok(argv);
            }
            let mut current = Dbs::empty()?;
            let mut inq = false;
            let mut insq = false;
            'token: loop {
                if inq {
                    if i == line.len() {
                        return Err(CoreError::UnbalancedQuotes);
                    }
                    let b = line[i];
                    if b == b'\\'
                        && i + 3 < line.len()
                        && line[i + 1] == b'x'
                        && line[i + 2].is_ascii_hexdigit()
                        && line[i + 3].is_ascii_hexdigit()
                    {
                        current.append(&[(hex_val(line[i + 2]) << 4) | hex_val(line[i + 3])])?;
                        i += 4;
                    } else if b == b'\\' && i + 1 < line.len() {
                        let c = match line[i + 1] {
                            b'n' => b'\n',
                            b'r' => b'\r',
                            b't' => b'\t',
                            b'b' => 0x08,
                            b'a' => 0x07,
                            c => c,
                        };
                        current.append(&[c])?;
                        i += 2;
                    } else if b == b'"' {
                        if i + 1 < line.len() && !line[i + 1].is_ascii_whitespace() {
                            return Err(CoreError::UnbalancedQuotes);
                        }
                        i += 1;
                        break 'token;
                    } else {
                        current.append(&[b])?;
                        i += 1;
                    }
                } else if insq {
                    if i == line.len() {
                        return Err(CoreError::UnbalancedQuotes);
                    }
                    let b = line[i];
                    if b == b'\\' && i + 1 < line.len() && line[i + 1] == b'\'' {
                        current.append(b"'")?;
                        i += 2;
                    } else if b == b'\'' {
                        if i + 1 < line.len() && !line[i + 1].is_ascii_whitespace() {
                            return Err(CoreError::UnbalancedQuotes);
                        }
                        i += 1;
                        break 'token;
                    } else {
                        current.append(&[b])?;
                        i += 1;
                    }
                } else {
                    if i == line.len() {
                        break 'token;
                    }
                    match line[i] {
                        b' ' | b'\n' | b'\r' | b'\t' => break 'token,
                        b'"' => {
                            inq = true;
                            i += 1;
                        }
                        b'\'' => {
                            insq = true;
                            i += 1;
                        }
                        c => {
                            current.append(&[c])?;
                            i += 1;
                        }
                    }
                }
            }
            argv.push(current);
        }
    }
}

impl cfmt::Write for Dbs {
    fn write_str(&mut self, s: &str) -> cfmt::Result {
        self.append(s.as_bytes()).map_err(|_| cfmt::Error)
    }
}

#[inline(always)]
fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => unreachable!("non-hex byte after hex check"),
    }
}
