use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    Universal,
    Application,
    Context,
    Private,
}

impl TagClass {
    pub(crate) fn bits(self) -> u8 {
        match self {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::Context => 0x80,
            TagClass::Private => 0xC0,
        }
    }

    pub(crate) fn from_bits(byte: u8) -> Self {
        match byte & 0xC0 {
            0x00 => TagClass::Universal,
            0x40 => TagClass::Application,
            0x80 => TagClass::Context,
            _ => TagClass::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

impl Tag {
    pub const BOOLEAN: Tag = Tag::universal(1);
    pub const INTEGER: Tag = Tag::universal(2);
    pub const OCTET_STRING: Tag = Tag::universal(4);
    pub const NULL: Tag = Tag::universal(5);
    pub const REAL: Tag = Tag::universal(9);
    pub const UTF8_STRING: Tag = Tag::universal(12);
    pub const RELATIVE_OID: Tag = Tag::universal(13);
    pub const SEQUENCE: Tag = Tag {
        class: TagClass::Universal,
        constructed: true,
        number: 16,
    };
    pub const SET: Tag = Tag {
        class: TagClass::Universal,
        constructed: true,
        number: 17,
    };

    pub const fn universal(number: u32) -> Self {
        Self {
            class: TagClass::Universal,
            constructed: false,
            number,
        }
    }

    /// Application tags in Glow always wrap a constructed sequence.
    pub const fn application(number: u32) -> Self {
        Self {
            class: TagClass::Application,
            constructed: true,
            number,
        }
    }

    /// Context tags are explicit, so they are constructed too.
    pub const fn context(number: u32) -> Self {
        Self {
            class: TagClass::Context,
            constructed: true,
            number,
        }
    }

    /// Compares class and number, ignoring the constructed bit.
    #[inline]
    pub fn matches(&self, other: Tag) -> bool {
        self.class == other.class && self.number == other.number
    }

    #[inline]
    pub fn is_context(&self, number: u32) -> bool {
        self.class == TagClass::Context && self.number == number
    }

    #[inline]
    pub fn is_application(&self, number: u32) -> bool {
        self.class == TagClass::Application && self.number == number
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class {
            TagClass::Universal => "UNIVERSAL",
            TagClass::Application => "APPLICATION",
            TagClass::Context => "CONTEXT",
            TagClass::Private => "PRIVATE",
        };
        write!(f, "{}({})", class, self.number)
    }
}
