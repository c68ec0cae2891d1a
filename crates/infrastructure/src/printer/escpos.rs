use domain::{Alignment, PrintDirective};

/// ESC/POS byte encoder.
///
/// Text goes out in code page 850 (selected by `initialize`), which covers
/// the Portuguese accented letters receipts carry.
#[derive(Debug, Default, Clone)]
pub struct EscPosEncoder {
    buffer: Vec<u8>,
}

impl EscPosEncoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn initialize(mut self) -> Self {
        // ESC @: Initialize printer
        self.buffer.extend_from_slice(&[0x1B, 0x40]);
        // ESC t 2: PC850 Multilingual
        self.buffer.extend_from_slice(&[0x1B, 0x74, 0x02]);
        self
    }

    pub fn align(mut self, alignment: Alignment) -> Self {
        // ESC a n: Align (0: Left, 1: Center, 2: Right)
        let n = match alignment {
            Alignment::Left => 0x00,
            Alignment::Center => 0x01,
            Alignment::Right => 0x02,
        };
        self.buffer.extend_from_slice(&[0x1B, 0x61, n]);
        self
    }

    pub fn bold(mut self, on: bool) -> Self {
        // ESC E n: Emphasized mode
        self.buffer.extend_from_slice(&[0x1B, 0x45, on as u8]);
        self
    }

    /// Thermal printers have no italic face; underline stands in for it.
    pub fn italic(mut self, on: bool) -> Self {
        // ESC - n: Underline mode
        self.buffer.extend_from_slice(&[0x1B, 0x2D, on as u8]);
        self
    }

    pub fn text_line(mut self, text: &str) -> Self {
        self.buffer.extend(encode_cp850(text));
        self.buffer.push(0x0A); // LF
        self
    }

    pub fn divider(self, columns: usize) -> Self {
        self.text_line(&"-".repeat(columns))
    }

    pub fn feed(mut self, n: u8) -> Self {
        // ESC d n: Print and feed n lines
        self.buffer.extend_from_slice(&[0x1B, 0x64, n]);
        self
    }

    pub fn cut(mut self) -> Self {
        // GS V 66 0: Feed to cut position and cut
        self.buffer.extend_from_slice(&[0x1D, 0x56, 66, 0]);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }

    /// Full job for a directive sequence, initialization included.
    pub fn encode(directives: &[PrintDirective], columns: usize) -> Vec<u8> {
        directives
            .iter()
            .fold(Self::new().initialize(), |enc, directive| enc.apply(directive, columns))
            .build()
    }

    pub fn apply(self, directive: &PrintDirective, columns: usize) -> Self {
        match directive {
            PrintDirective::Align(alignment) => self.align(*alignment),
            PrintDirective::Bold(on) => self.bold(*on),
            PrintDirective::Italic(on) => self.italic(*on),
            PrintDirective::Line(text) => self.text_line(text),
            PrintDirective::Divider => self.divider(columns),
            PrintDirective::Feed(n) => self.feed(*n),
            PrintDirective::Cut => self.cut(),
        }
    }
}

/// Unicode to CP850. ASCII passes through; unmapped characters become `?`.
pub fn encode_cp850(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.chars() {
        if (ch as u32) < 0x80 {
            out.push(ch as u8);
        } else if let Some(byte) = unicode_to_cp850(ch) {
            out.push(byte);
        } else {
            tracing::warn!(character = %ch, "Character not printable in CP850, replacing with '?'");
            out.push(b'?');
        }
    }
    out
}

fn unicode_to_cp850(ch: char) -> Option<u8> {
    let byte = match ch {
        'Ç' => 0x80,
        'ü' => 0x81,
        'é' => 0x82,
        'â' => 0x83,
        'ä' => 0x84,
        'à' => 0x85,
        'ç' => 0x87,
        'ê' => 0x88,
        'è' => 0x8A,
        'É' => 0x90,
        'ô' => 0x93,
        'ö' => 0x94,
        'ò' => 0x95,
        'ù' => 0x97,
        'Ü' => 0x9A,
        '£' => 0x9C,
        'á' => 0xA0,
        'í' => 0xA1,
        'ó' => 0xA2,
        'ú' => 0xA3,
        'ñ' => 0xA4,
        'Ñ' => 0xA5,
        'ª' => 0xA6,
        'º' => 0xA7,
        'Á' => 0xB5,
        'Â' => 0xB6,
        'À' => 0xB7,
        'ã' => 0xC6,
        'Ã' => 0xC7,
        'Ê' => 0xD2,
        'Í' => 0xD6,
        'Ó' => 0xE0,
        'Ô' => 0xE2,
        'õ' => 0xE4,
        'Õ' => 0xE5,
        'Ú' => 0xE9,
        '°' => 0xF8,
        _ => return None,
    };
    Some(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_selects_code_page() {
        let bytes = EscPosEncoder::new().initialize().build();
        assert_eq!(bytes, vec![0x1B, 0x40, 0x1B, 0x74, 0x02]);
    }

    #[test]
    fn test_directives_map_to_commands() {
        let directives = vec![
            PrintDirective::Align(Alignment::Right),
            PrintDirective::Bold(true),
            PrintDirective::Line("TOTAL".to_string()),
            PrintDirective::Divider,
            PrintDirective::Feed(3),
            PrintDirective::Cut,
        ];
        let bytes = EscPosEncoder::encode(&directives, 4);

        let mut expected = vec![0x1B, 0x40, 0x1B, 0x74, 0x02];
        expected.extend_from_slice(&[0x1B, 0x61, 0x02]);
        expected.extend_from_slice(&[0x1B, 0x45, 0x01]);
        expected.extend_from_slice(b"TOTAL\n");
        expected.extend_from_slice(b"----\n");
        expected.extend_from_slice(&[0x1B, 0x64, 0x03]);
        expected.extend_from_slice(&[0x1D, 0x56, 66, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_portuguese_text_is_encoded() {
        assert_eq!(encode_cp850("Obrigado pela preferência!"), {
            let mut v = b"Obrigado pela prefer".to_vec();
            v.push(0x88);
            v.extend_from_slice(b"ncia!");
            v
        });
        assert_eq!(encode_cp850("Pão"), vec![b'P', 0xC6, b'o']);
        assert_eq!(encode_cp850("Ação"), vec![b'A', 0x87, 0xC6, b'o']);
    }

    #[test]
    fn test_unmapped_characters_become_question_marks() {
        assert_eq!(encode_cp850("€5"), b"?5".to_vec());
    }
}
