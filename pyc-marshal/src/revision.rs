//! Format revisions and the structural policy each one implies.
//!
//! A revision is identified by the 16-bit magic number found in the header of
//! a precompiled file. Magics are not monotonic across the 2.x/3.x split
//! (3.x restarted at 3000), so every known magic is listed explicitly and
//! resolved into one of a small closed set of [`Layout`]s.

use crate::error::{MarshalError, Result};

/// Width of the fixed integer fields of a code object
/// (argument count, local count, stack size, flags, first line number).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldWidth {
    Short,
    Long,
}

impl FieldWidth {
    pub fn bytes(self) -> usize {
        match self {
            FieldWidth::Short => 2,
            FieldWidth::Long => 4,
        }
    }
}

/// Back-reference opcodes a revision writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefOpcodes {
    None,
    /// `R` indexes previously interned text (0-based).
    StringRefs,
    /// `r` indexes objects recorded through the tag flag bit (1-based).
    ObjectRefs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RevisionPolicy {
    pub arg_width: FieldWidth,
    pub has_kwonlyarg_count: bool,
    pub has_posonlyarg_count: bool,
    pub ref_opcodes: RefOpcodes,
    /// The runtime's `str` type is a byte string, so interned text may stand
    /// in for raw bytes (bytecode, line table).
    pub str_is_bytes: bool,
}

/// Structural variants of the code-object encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    /// 1.5 – 2.2: 16-bit argument count, local count, stack size and flags.
    Short,
    /// 2.3: 32-bit fields.
    Classic,
    /// 2.4 – 2.7: interned strings referenced with `R`.
    StringRefs,
    /// 3.0 before keyword-only arguments.
    Py3k,
    /// 3.0 – 3.3: keyword-only argument count.
    KwOnly,
    /// 3.4 – 3.8a1: flag bit and `r` object references.
    ObjectRefs,
    /// 3.8 – 3.10: positional-only argument count.
    PosOnly,
}

impl Layout {
    pub const fn policy(self) -> RevisionPolicy {
        use FieldWidth::*;
        let (arg_width, has_kwonlyarg_count, has_posonlyarg_count, ref_opcodes, str_is_bytes) =
            match self {
                Layout::Short => (Short, false, false, RefOpcodes::None, true),
                Layout::Classic => (Long, false, false, RefOpcodes::None, true),
                Layout::StringRefs => (Long, false, false, RefOpcodes::StringRefs, true),
                Layout::Py3k => (Long, false, false, RefOpcodes::None, false),
                Layout::KwOnly => (Long, true, false, RefOpcodes::None, false),
                Layout::ObjectRefs => (Long, true, false, RefOpcodes::ObjectRefs, false),
                Layout::PosOnly => (Long, true, true, RefOpcodes::ObjectRefs, false),
            };
        RevisionPolicy {
            arg_width,
            has_kwonlyarg_count,
            has_posonlyarg_count,
            ref_opcodes,
            str_is_bytes,
        }
    }
}

// magic, version, layout
const REVISIONS: &[(u16, &str, Layout)] = &[
    (20121, "1.5", Layout::Short),
    (50428, "1.6", Layout::Short),
    (50823, "2.0", Layout::Short),
    (60202, "2.1", Layout::Short),
    (60717, "2.2", Layout::Short),
    (62011, "2.3", Layout::Classic),
    (62021, "2.3", Layout::Classic),
    (62041, "2.4", Layout::StringRefs),
    (62051, "2.4", Layout::StringRefs),
    (62061, "2.4", Layout::StringRefs),
    (62071, "2.5", Layout::StringRefs),
    (62081, "2.5", Layout::StringRefs),
    (62091, "2.5", Layout::StringRefs),
    (62092, "2.5", Layout::StringRefs),
    (62101, "2.5", Layout::StringRefs),
    (62111, "2.5", Layout::StringRefs),
    (62121, "2.5", Layout::StringRefs),
    (62131, "2.5", Layout::StringRefs),
    (62151, "2.6", Layout::StringRefs),
    (62161, "2.6", Layout::StringRefs),
    (62171, "2.7", Layout::StringRefs),
    (62181, "2.7", Layout::StringRefs),
    (62191, "2.7", Layout::StringRefs),
    (62201, "2.7", Layout::StringRefs),
    (62211, "2.7", Layout::StringRefs),
    (3000, "3.0", Layout::Py3k),
    (3010, "3.0", Layout::Py3k),
    (3020, "3.0", Layout::Py3k),
    (3030, "3.0", Layout::KwOnly),
    (3040, "3.0", Layout::KwOnly),
    (3050, "3.0", Layout::KwOnly),
    (3060, "3.0", Layout::KwOnly),
    (3061, "3.0", Layout::KwOnly),
    (3071, "3.0", Layout::KwOnly),
    (3081, "3.0", Layout::KwOnly),
    (3091, "3.0", Layout::KwOnly),
    (3101, "3.0", Layout::KwOnly),
    (3103, "3.0", Layout::KwOnly),
    (3111, "3.0", Layout::KwOnly),
    (3131, "3.0", Layout::KwOnly),
    (3141, "3.1", Layout::KwOnly),
    (3151, "3.1", Layout::KwOnly),
    (3160, "3.2", Layout::KwOnly),
    (3170, "3.2", Layout::KwOnly),
    (3180, "3.2", Layout::KwOnly),
    (3190, "3.3", Layout::KwOnly),
    (3200, "3.3", Layout::KwOnly),
    (3210, "3.3", Layout::KwOnly),
    (3220, "3.3", Layout::KwOnly),
    (3230, "3.3", Layout::KwOnly),
    (3250, "3.4", Layout::ObjectRefs),
    (3260, "3.4", Layout::ObjectRefs),
    (3270, "3.4", Layout::ObjectRefs),
    (3280, "3.4", Layout::ObjectRefs),
    (3290, "3.4", Layout::ObjectRefs),
    (3300, "3.4", Layout::ObjectRefs),
    (3310, "3.4", Layout::ObjectRefs),
    (3320, "3.5", Layout::ObjectRefs),
    (3330, "3.5", Layout::ObjectRefs),
    (3340, "3.5", Layout::ObjectRefs),
    (3350, "3.5", Layout::ObjectRefs),
    (3351, "3.5", Layout::ObjectRefs),
    (3360, "3.6", Layout::ObjectRefs),
    (3361, "3.6", Layout::ObjectRefs),
    (3370, "3.6", Layout::ObjectRefs),
    (3371, "3.6", Layout::ObjectRefs),
    (3372, "3.6", Layout::ObjectRefs),
    (3373, "3.6", Layout::ObjectRefs),
    (3375, "3.6", Layout::ObjectRefs),
    (3376, "3.6", Layout::ObjectRefs),
    (3377, "3.6", Layout::ObjectRefs),
    (3378, "3.6", Layout::ObjectRefs),
    (3379, "3.6", Layout::ObjectRefs),
    (3390, "3.7", Layout::ObjectRefs),
    (3391, "3.7", Layout::ObjectRefs),
    (3392, "3.7", Layout::ObjectRefs),
    (3393, "3.7", Layout::ObjectRefs),
    (3394, "3.7", Layout::ObjectRefs),
    (3400, "3.8", Layout::ObjectRefs),
    (3401, "3.8", Layout::ObjectRefs),
    (3410, "3.8", Layout::PosOnly),
    (3411, "3.8", Layout::PosOnly),
    (3412, "3.8", Layout::PosOnly),
    (3413, "3.8", Layout::PosOnly),
    (3420, "3.9", Layout::PosOnly),
    (3421, "3.9", Layout::PosOnly),
    (3422, "3.9", Layout::PosOnly),
    (3423, "3.9", Layout::PosOnly),
    (3424, "3.9", Layout::PosOnly),
    (3425, "3.9", Layout::PosOnly),
    (3430, "3.10", Layout::PosOnly),
    (3431, "3.10", Layout::PosOnly),
    (3432, "3.10", Layout::PosOnly),
    (3433, "3.10", Layout::PosOnly),
    (3434, "3.10", Layout::PosOnly),
    (3435, "3.10", Layout::PosOnly),
    (3436, "3.10", Layout::PosOnly),
    (3437, "3.10", Layout::PosOnly),
    (3438, "3.10", Layout::PosOnly),
    (3439, "3.10", Layout::PosOnly),
];

/// A resolved format revision. Read-only for the whole decode call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Revision {
    magic: u16,
    version: &'static str,
    layout: Layout,
}

impl Revision {
    pub fn from_magic(magic: u16) -> Result<Self> {
        REVISIONS
            .iter()
            .find(|(m, _, _)| *m == magic)
            .map(|&(magic, version, layout)| Revision {
                magic,
                version,
                layout,
            })
            .ok_or(MarshalError::UnknownRevision { magic })
    }

    /// Every known revision, in table order.
    pub fn all() -> impl Iterator<Item = Revision> {
        REVISIONS.iter().map(|&(magic, version, layout)| Revision {
            magic,
            version,
            layout,
        })
    }

    #[inline]
    pub fn magic(&self) -> u16 {
        self.magic
    }

    /// Release line the magic belongs to, e.g. `"2.7"`.
    #[inline]
    pub fn version(&self) -> &'static str {
        self.version
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn policy(&self) -> RevisionPolicy {
        self.layout.policy()
    }
}
