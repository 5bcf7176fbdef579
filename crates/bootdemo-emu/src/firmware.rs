//! A high-level model of the BIOS video services
//!
//! Only display page 0 is modelled. Graphics modes are tracked as a character grid, the way
//! the BIOS font renderer lays text out, rather than as pixels.

use bootdemo_bios::{VideoMode, VideoService, WriteStringFlags};

use crate::memory::{Memory, linear};

pub const ROWS: u8 = 25;
/// Attribute of a cleared text cell, light grey on black
pub const DEFAULT_ATTRIBUTE: u8 = 0x07;

const BELL: u8 = 0x07;
const BACKSPACE: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: u8,
    pub attribute: u8,
}

impl Cell {
    const BLANK: Self = Self {
        ch: b' ',
        attribute: DEFAULT_ATTRIBUTE,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub row: u8,
    pub column: u8,
}

#[derive(Debug, Clone)]
pub struct Firmware {
    mode: VideoMode,
    columns: u8,
    cursor: Cursor,
    cells: Vec<Cell>,
    transcript: Vec<u8>,
    calls: u64,
}

impl Default for Firmware {
    fn default() -> Self {
        Self::new()
    }
}

impl Firmware {
    /// Firmware as it hands over: 80x25 colour text, cleared
    pub fn new() -> Self {
        let mode = VideoMode::TEXT_80X25;
        Self {
            mode,
            columns: mode.text_columns(),
            cursor: Cursor::default(),
            cells: vec![Cell::BLANK; ROWS as usize * mode.text_columns() as usize],
            transcript: Vec::new(),
            calls: 0,
        }
    }

    pub fn video_mode(&self) -> VideoMode {
        self.mode
    }

    pub fn columns(&self) -> u8 {
        self.columns
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Every byte handed to an output service, control characters included
    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Number of video service calls made, including ignored ones
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn cell(&self, row: u8, column: u8) -> Option<Cell> {
        if row >= ROWS || column >= self.columns {
            return None;
        }
        Some(self.cells[self.index(row, column)])
    }

    /// The characters of one row, trailing blanks removed, empty past the last row
    pub fn row_text(&self, row: u8) -> String {
        if row >= ROWS {
            return String::new();
        }
        let start = row as usize * self.columns as usize;
        let text: String = self.cells[start..start + self.columns as usize]
            .iter()
            .map(|cell| cell.ch as char)
            .collect();
        text.trim_end().to_string()
    }

    /// The whole screen, one line per row, without trailing blank rows
    pub fn screen_text(&self) -> String {
        let mut rows: Vec<String> = (0..ROWS).map(|row| self.row_text(row)).collect();
        while rows.last().is_some_and(|row| row.is_empty()) {
            rows.pop();
        }
        rows.join("\n")
    }

    fn index(&self, row: u8, column: u8) -> usize {
        row as usize * self.columns as usize + column as usize
    }

    /// Handles a decoded `int 0x10` call
    ///
    /// `es` is the segment a write-string call reads its string from.
    pub fn call(&mut self, service: VideoService, memory: &Memory, es: u16) {
        self.calls += 1;
        tracing::trace!(?service, "video service call");
        match service {
            VideoService::SetMode { mode } => self.set_mode(mode),
            VideoService::Teletype { ch, page, color } => {
                if !self.check_page(page) {
                    return;
                }
                // Text modes keep the cell's attribute, graphics modes draw in the given colour
                let attribute = self.mode.is_graphics().then_some(color);
                self.put_char(ch, attribute);
            }
            VideoService::WriteString {
                flags,
                page,
                attribute,
                len,
                row,
                column,
                offset,
            } => {
                if !self.check_page(page) {
                    return;
                }
                self.write_string(flags, attribute, len, row, column, memory, es, offset);
            }
        }
    }

    /// Counts a call whose function has no handler
    pub fn ignored_call(&mut self, function: u8) {
        self.calls += 1;
        tracing::warn!(function, "unsupported video function ignored");
    }

    fn check_page(&self, page: u8) -> bool {
        if page != 0 {
            tracing::warn!(page, "output to an unmodelled display page ignored");
        }
        page == 0
    }

    fn set_mode(&mut self, mode: VideoMode) {
        // Bit 7 asks the BIOS to keep the display memory
        let clear = mode.0 & 0x80 == 0;
        let mode = VideoMode(mode.0 & 0x7F);
        tracing::debug!(mode = mode.0, clear, "set video mode");
        self.mode = mode;
        self.cursor = Cursor::default();
        let columns = mode.text_columns();
        if clear || columns != self.columns {
            self.columns = columns;
            self.cells = vec![Cell::BLANK; ROWS as usize * columns as usize];
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_string(
        &mut self,
        flags: WriteStringFlags,
        attribute: u8,
        len: u16,
        row: u8,
        column: u8,
        memory: &Memory,
        es: u16,
        offset: u16,
    ) {
        let saved = self.cursor;
        self.cursor = Cursor {
            row: row.min(ROWS - 1),
            column: column.min(self.columns - 1),
        };
        let inline = flags.contains(WriteStringFlags::INLINE_ATTRIBUTES);
        let stride = if inline { 2 } else { 1 };
        for i in 0..len {
            let at = offset.wrapping_add(i.wrapping_mul(stride));
            let ch = memory.read_u8(es, at);
            let attribute = if inline {
                memory.read_u8(es, at.wrapping_add(1))
            } else {
                attribute
            };
            self.put_char(ch, Some(attribute));
        }
        tracing::trace!(
            "write string of {len} chars from {:#07x}",
            linear(es, offset)
        );
        if !flags.contains(WriteStringFlags::UPDATE_CURSOR) {
            self.cursor = saved;
        }
    }

    fn put_char(&mut self, ch: u8, attribute: Option<u8>) {
        self.transcript.push(ch);
        match ch {
            b'\r' => self.cursor.column = 0,
            b'\n' => self.line_feed(),
            BACKSPACE => self.cursor.column = self.cursor.column.saturating_sub(1),
            BELL => {}
            _ => {
                let index = self.index(self.cursor.row, self.cursor.column);
                let cell = &mut self.cells[index];
                cell.ch = ch;
                if let Some(attribute) = attribute {
                    cell.attribute = attribute;
                }
                self.cursor.column += 1;
                if self.cursor.column >= self.columns {
                    self.cursor.column = 0;
                    self.line_feed();
                }
            }
        }
    }

    fn line_feed(&mut self) {
        if self.cursor.row + 1 < ROWS {
            self.cursor.row += 1;
            return;
        }
        let columns = self.columns as usize;
        self.cells.drain(..columns);
        self.cells.extend(std::iter::repeat_n(Cell::BLANK, columns));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teletype(fw: &mut Firmware, text: &[u8], color: u8) {
        let memory = Memory::new();
        for &ch in text {
            fw.call(VideoService::Teletype { ch, page: 0, color }, &memory, 0);
        }
    }

    #[test]
    fn test_set_mode_clears() {
        let mut fw = Firmware::new();
        teletype(&mut fw, b"abc", 0);
        fw.call(
            VideoService::SetMode {
                mode: VideoMode::VGA_320X200X256,
            },
            &Memory::new(),
            0,
        );
        assert_eq!(fw.video_mode(), VideoMode::VGA_320X200X256);
        assert_eq!(fw.columns(), 40);
        assert_eq!(fw.cursor(), Cursor::default());
        assert_eq!(fw.screen_text(), "");
        // The transcript is a log, it survives the mode switch
        assert_eq!(fw.transcript(), b"abc");
    }

    #[test]
    fn test_teletype_controls() {
        let mut fw = Firmware::new();
        teletype(&mut fw, b"ab\x08c\x07\r\nd", 0x0C);
        assert_eq!(fw.screen_text(), "ac\nd");
        assert_eq!(fw.cursor(), Cursor { row: 1, column: 1 });
        // Text mode keeps the existing attribute
        assert_eq!(fw.cell(0, 0).unwrap().attribute, DEFAULT_ATTRIBUTE);
    }

    #[test]
    fn test_teletype_graphics_colour() {
        let mut fw = Firmware::new();
        fw.set_mode(VideoMode::VGA_320X200X256);
        teletype(&mut fw, b"x", 0x0C);
        assert_eq!(
            fw.cell(0, 0),
            Some(Cell {
                ch: b'x',
                attribute: 0x0C
            })
        );
    }

    #[test]
    fn test_wrap_and_scroll() {
        let mut fw = Firmware::new();
        fw.set_mode(VideoMode::TEXT_40X25);
        teletype(&mut fw, &[b'x'; 41], 0);
        assert_eq!(fw.cursor(), Cursor { row: 1, column: 1 });
        teletype(&mut fw, &[b'\n'; 30], 0);
        assert_eq!(fw.cursor().row, ROWS - 1);
        // Both rows of x scrolled off the top
        assert_eq!(fw.screen_text(), "");
    }

    #[test]
    fn test_write_string() {
        let mut memory = Memory::new();
        memory.load(linear(0x07C0, 0x0040), b"Hello");
        let mut fw = Firmware::new();
        fw.call(
            VideoService::WriteString {
                flags: WriteStringFlags::empty(),
                page: 0,
                attribute: 0x1E,
                len: 5,
                row: 2,
                column: 3,
                offset: 0x0040,
            },
            &memory,
            0x07C0,
        );
        assert_eq!(fw.row_text(2), "   Hello");
        assert_eq!(fw.cell(2, 3).unwrap().attribute, 0x1E);
        // Cursor restored without UPDATE_CURSOR
        assert_eq!(fw.cursor(), Cursor::default());
    }

    #[test]
    fn test_write_string_inline_attributes() {
        let mut memory = Memory::new();
        memory.load(0x500, &[b'o', 0x4F, b'k', 0x2A]);
        let mut fw = Firmware::new();
        fw.call(
            VideoService::WriteString {
                flags: WriteStringFlags::INLINE_ATTRIBUTES | WriteStringFlags::UPDATE_CURSOR,
                page: 0,
                attribute: 0,
                len: 2,
                row: 0,
                column: 0,
                offset: 0x500,
            },
            &memory,
            0,
        );
        assert_eq!(fw.row_text(0), "ok");
        assert_eq!(fw.cell(0, 1).unwrap().attribute, 0x2A);
        assert_eq!(fw.cursor(), Cursor { row: 0, column: 2 });
        assert_eq!(fw.transcript(), b"ok");
    }

    #[test]
    fn test_set_mode_keeps_memory() {
        let mut fw = Firmware::new();
        teletype(&mut fw, b"kept\r\nhere", 0);
        fw.call(
            VideoService::SetMode {
                mode: VideoMode(0x83),
            },
            &Memory::new(),
            0,
        );
        assert_eq!(fw.video_mode(), VideoMode::TEXT_80X25);
        assert_eq!(fw.cursor(), Cursor::default());
        assert_eq!(fw.screen_text(), "kept\nhere");
    }

    #[test]
    fn test_row_text_past_last_row() {
        let mut fw = Firmware::new();
        teletype(&mut fw, b"x", 0);
        assert_eq!(fw.row_text(ROWS), "");
        assert_eq!(fw.row_text(u8::MAX), "");
        assert_eq!(fw.row_text(0), "x");
    }

    #[test]
    fn test_ignored_call_counted() {
        let mut fw = Firmware::new();
        fw.ignored_call(0x0F);
        assert_eq!(fw.calls(), 1);
        assert!(fw.transcript().is_empty());
    }

    #[test]
    fn test_other_pages_ignored() {
        let mut fw = Firmware::new();
        fw.call(
            VideoService::Teletype {
                ch: b'z',
                page: 1,
                color: 0,
            },
            &Memory::new(),
            0,
        );
        assert_eq!(fw.calls(), 1);
        assert!(fw.transcript().is_empty());
    }
}
