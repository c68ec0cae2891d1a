use serde::{Deserialize, Serialize};

use super::{Alignment, PrintDirective, ReceiptPayload};

/// Fixed texts and money formatting of a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLayout {
    pub store_name: String,
    pub footer: String,
    pub currency_prefix: String,
    pub feed_lines: u8,
}

impl Default for ReceiptLayout {
    fn default() -> Self {
        Self {
            store_name: "RESTAURANTE".to_string(),
            footer: "Obrigado pela preferência!".to_string(),
            currency_prefix: "R$ ".to_string(),
            feed_lines: 3,
        }
    }
}

/// Turns a receipt payload into ordered print directives.
///
/// Pure and deterministic: the same payload always yields the same
/// sequence, whatever backend ends up printing it.
#[derive(Debug, Clone, Default)]
pub struct PrinterCommandBuilder {
    layout: ReceiptLayout,
}

impl PrinterCommandBuilder {
    pub fn new(layout: ReceiptLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ReceiptLayout {
        &self.layout
    }

    pub fn build(&self, payload: &ReceiptPayload) -> Vec<PrintDirective> {
        use PrintDirective::*;

        let mut out = vec![
            Align(Alignment::Center),
            Bold(true),
            Line(self.layout.store_name.clone()),
            Bold(false),
            Align(Alignment::Left),
            Line(format!("Pedido: #{}", payload.order_number)),
            Line(format!("Cliente: {}", payload.customer_name)),
        ];
        if let Some(phone) = payload.customer_phone.as_deref().filter(|p| !p.trim().is_empty()) {
            out.push(Line(format!("Telefone: {}", phone)));
        }
        out.push(Divider);

        for item in &payload.items {
            out.push(Align(Alignment::Left));
            out.push(Line(format!(
                "{}x {}",
                format_quantity(item.quantity),
                item.product_name
            )));
            out.push(Align(Alignment::Right));
            out.push(Line(self.money(item.subtotal)));
            if let Some(notes) = item.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                out.push(Align(Alignment::Left));
                out.push(Italic(true));
                out.push(Line(format!("Obs: {}", notes)));
                out.push(Italic(false));
            }
        }

        out.extend([
            Divider,
            Align(Alignment::Right),
            Bold(true),
            Line(format!("TOTAL: {}", self.money(payload.total))),
            Bold(false),
            Align(Alignment::Center),
            Line(self.layout.footer.clone()),
            Feed(self.layout.feed_lines),
            Cut,
        ]);
        out
    }

    /// Text lines of a directive sequence, as they would appear on paper.
    pub fn rendered_lines(directives: &[PrintDirective], columns: usize) -> Vec<String> {
        directives
            .iter()
            .filter_map(|d| match d {
                PrintDirective::Line(text) => Some(text.clone()),
                PrintDirective::Divider => Some("-".repeat(columns)),
                _ => None,
            })
            .collect()
    }

    fn money(&self, value: f64) -> String {
        format!("{}{}", self.layout.currency_prefix, format_amount(value))
    }
}

/// Two fraction digits, never "-0.00".
fn format_amount(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 || !rounded.is_finite() {
        return "0.00".to_string();
    }
    format!("{:.2}", rounded)
}

fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{}", quantity as i64)
    } else {
        let s = format!("{:.3}", quantity);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::ReceiptItem;
    use PrintDirective::*;

    fn sample_payload() -> ReceiptPayload {
        ReceiptPayload {
            order_number: "42".to_string(),
            customer_name: "Ana".to_string(),
            customer_phone: None,
            items: vec![ReceiptItem::new(2.0, "X", 20.00)],
            total: 20.00,
        }
    }

    /// True if `needle` appears in `haystack` in order, gaps allowed.
    fn is_subsequence(haystack: &[PrintDirective], needle: &[PrintDirective]) -> bool {
        let mut it = haystack.iter();
        needle.iter().all(|n| it.any(|h| h == n))
    }

    #[test]
    fn test_order_receipt_sequence() {
        let builder = PrinterCommandBuilder::default();
        let directives = builder.build(&sample_payload());

        assert_eq!(&directives[..4], &[
            Align(Alignment::Center),
            Bold(true),
            Line("RESTAURANTE".to_string()),
            Bold(false),
        ]);
        assert!(is_subsequence(&directives, &[
            Line("Pedido: #42".to_string()),
            Line("Cliente: Ana".to_string()),
            Divider,
            Line("2x X".to_string()),
            Align(Alignment::Right),
            Line("R$ 20.00".to_string()),
            Divider,
            Align(Alignment::Right),
            Bold(true),
            Line("TOTAL: R$ 20.00".to_string()),
            Cut,
        ]));
        assert_eq!(directives.last(), Some(&Cut));
        assert_eq!(directives[directives.len() - 2], Feed(3));
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = PrinterCommandBuilder::default();
        let payload = sample_payload();
        assert_eq!(builder.build(&payload), builder.build(&payload));
    }

    #[test]
    fn test_phone_and_notes_lines() {
        let mut payload = sample_payload();
        payload.customer_phone = Some("(11) 99999-0000".to_string());
        payload.items = vec![ReceiptItem::new(1.0, "Pizza", 45.5).with_notes("sem cebola")];

        let directives = PrinterCommandBuilder::default().build(&payload);
        assert!(is_subsequence(&directives, &[
            Line("Cliente: Ana".to_string()),
            Line("Telefone: (11) 99999-0000".to_string()),
            Divider,
            Line("1x Pizza".to_string()),
            Line("R$ 45.50".to_string()),
            Italic(true),
            Line("Obs: sem cebola".to_string()),
            Italic(false),
        ]));
    }

    #[test]
    fn test_blank_phone_is_skipped() {
        let mut payload = sample_payload();
        payload.customer_phone = Some("  ".to_string());
        let lines = PrinterCommandBuilder::rendered_lines(&PrinterCommandBuilder::default().build(&payload), 32);
        assert!(!lines.iter().any(|l| l.starts_with("Telefone")));
    }

    #[test]
    fn test_total_is_rendered_not_recomputed() {
        let mut payload = sample_payload();
        payload.total = 23.1; // service fee folded in by the caller
        let lines = PrinterCommandBuilder::rendered_lines(&PrinterCommandBuilder::default().build(&payload), 32);
        assert!(lines.contains(&"TOTAL: R$ 23.10".to_string()));
    }

    #[test]
    fn test_amount_and_quantity_formatting() {
        assert_eq!(format_amount(20.0), "20.00");
        assert_eq!(format_amount(0.006), "0.01");
        assert_eq!(format_amount(-0.001), "0.00");
        assert_eq!(format_quantity(3.0), "3");
        assert_eq!(format_quantity(0.75), "0.75");
        assert_eq!(format_quantity(1.250), "1.25");
    }

    #[test]
    fn test_rendered_lines_expand_dividers() {
        let lines = PrinterCommandBuilder::rendered_lines(&[Divider, Line("a".to_string()), Cut], 4);
        assert_eq!(lines, vec!["----".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_custom_layout() {
        let builder = PrinterCommandBuilder::new(ReceiptLayout {
            store_name: "CANTINA".to_string(),
            footer: "Volte sempre".to_string(),
            currency_prefix: String::new(),
            feed_lines: 5,
        });
        let directives = builder.build(&sample_payload());
        assert!(directives.contains(&Line("CANTINA".to_string())));
        assert!(directives.contains(&Line("TOTAL: 20.00".to_string())));
        assert!(directives.contains(&Feed(5)));
    }
}
