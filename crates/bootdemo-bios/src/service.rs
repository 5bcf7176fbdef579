//! BIOS video services (`int 0x10`)
//!
//! A [`VideoService`] names one firmware call together with its parameters. It is lowered to
//! the raw register convention with [`VideoService::registers`], and recovered from live
//! registers with [`VideoService::decode`].

use bitflags::bitflags;

/// The interrupt vector of the BIOS video services
pub const VIDEO_INTERRUPT: u8 = 0x10;

/// The general purpose registers a video service call reads
///
/// `ES` is not included: the string segment of a write-string call is whatever `ES` holds
/// when the call is made, which the entry sequence sets once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub ax: u16,
    pub bx: u16,
    pub cx: u16,
    pub dx: u16,
    pub bp: u16,
}

const fn join(high: u8, low: u8) -> u16 {
    (high as u16) << 8 | low as u16
}

impl Registers {
    pub const fn ah(&self) -> u8 {
        (self.ax >> 8) as u8
    }

    pub const fn al(&self) -> u8 {
        self.ax as u8
    }

    pub const fn bh(&self) -> u8 {
        (self.bx >> 8) as u8
    }

    pub const fn bl(&self) -> u8 {
        self.bx as u8
    }

    pub const fn dh(&self) -> u8 {
        (self.dx >> 8) as u8
    }

    pub const fn dl(&self) -> u8 {
        self.dx as u8
    }
}

/// A BIOS video mode number
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoMode(pub u8);

impl VideoMode {
    /// 40x25 text, 16 colours
    pub const TEXT_40X25: Self = Self(0x01);
    /// 80x25 text, 16 colours, the mode firmware usually hands over in
    pub const TEXT_80X25: Self = Self(0x03);
    /// 320x200 graphics, 256 colours
    pub const VGA_320X200X256: Self = Self(0x13);

    /// Number of character columns teletype output wraps at
    pub const fn text_columns(self) -> u8 {
        match self.0 {
            0x00 | 0x01 | 0x04 | 0x05 | 0x0D | 0x13 => 40,
            _ => 80,
        }
    }

    pub const fn is_graphics(self) -> bool {
        matches!(self.0, 0x04..=0x06 | 0x0D..=0x13)
    }
}

bitflags! {
    /// Write mode of the write-string service, passed in `AL`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteStringFlags: u8 {
        /// Leave the cursor after the last character instead of restoring it
        const UPDATE_CURSOR = 0x01;
        /// The string holds character/attribute pairs, `BL` is ignored
        const INLINE_ATTRIBUTES = 0x02;
    }
}

/// A call into the BIOS video services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoService {
    /// `AH=0x00`: switches the display mode, clearing the screen
    SetMode { mode: VideoMode },
    /// `AH=0x0E`: writes one character at the cursor and advances it
    Teletype { ch: u8, page: u8, color: u8 },
    /// `AH=0x13`: writes `len` characters from `ES:offset` starting at `row`/`column`
    WriteString {
        flags: WriteStringFlags,
        page: u8,
        attribute: u8,
        len: u16,
        row: u8,
        column: u8,
        offset: u16,
    },
}

impl VideoService {
    pub const SET_MODE: u8 = 0x00;
    pub const TELETYPE: u8 = 0x0E;
    pub const WRITE_STRING: u8 = 0x13;

    /// The function number, passed in `AH`
    pub const fn function(&self) -> u8 {
        match self {
            Self::SetMode { .. } => Self::SET_MODE,
            Self::Teletype { .. } => Self::TELETYPE,
            Self::WriteString { .. } => Self::WRITE_STRING,
        }
    }

    /// Lowers the call to the register values the firmware expects
    ///
    /// Registers a service does not read are left zero.
    pub const fn registers(&self) -> Registers {
        let ah = self.function();
        match *self {
            Self::SetMode { mode } => Registers {
                ax: join(ah, mode.0),
                bx: 0,
                cx: 0,
                dx: 0,
                bp: 0,
            },
            Self::Teletype { ch, page, color } => Registers {
                ax: join(ah, ch),
                bx: join(page, color),
                cx: 0,
                dx: 0,
                bp: 0,
            },
            Self::WriteString {
                flags,
                page,
                attribute,
                len,
                row,
                column,
                offset,
            } => Registers {
                ax: join(ah, flags.bits()),
                bx: join(page, attribute),
                cx: len,
                dx: join(row, column),
                bp: offset,
            },
        }
    }

    /// Recovers the call from register values, `None` if the function isn't modelled
    pub fn decode(regs: &Registers) -> Option<Self> {
        match regs.ah() {
            Self::SET_MODE => Some(Self::SetMode {
                mode: VideoMode(regs.al()),
            }),
            Self::TELETYPE => Some(Self::Teletype {
                ch: regs.al(),
                page: regs.bh(),
                color: regs.bl(),
            }),
            Self::WRITE_STRING => Some(Self::WriteString {
                flags: WriteStringFlags::from_bits_truncate(regs.al()),
                page: regs.bh(),
                attribute: regs.bl(),
                len: regs.cx,
                row: regs.dh(),
                column: regs.dl(),
                offset: regs.bp,
            }),
            _ => None,
        }
    }
}
