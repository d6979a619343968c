//! Printable ticket PDF: one A5 page per ticket, QR drawn as vector squares.

use printpdf::path::PaintMode;
use printpdf::{BuiltinFont, Color, Mm, PdfDocument, PdfLayerReference, Rect, Rgb};
use qrcode::{Color as QrColor, QrCode};

use super::TicketError;

const PAGE_WIDTH_MM: f32 = 148.0;
const PAGE_HEIGHT_MM: f32 = 210.0;
const MARGIN_MM: f32 = 16.0;
const QR_SIDE_MM: f32 = 72.0;

/// Everything printed on one ticket page.
pub struct TicketPage<'a> {
    pub event_name: &'a str,
    pub venue: &'a str,
    pub city: &'a str,
    /// Preformatted start time, e.g. "Sat 01 Mar 2025, 18:00".
    pub starts_at: &'a str,
    pub ticket_type: &'a str,
    pub ticket_code: &'a str,
    pub attendee: Option<&'a str>,
    pub qr_payload: &'a str,
}

pub fn render_ticket_pdf(
    order_number: &str,
    pages: &[TicketPage<'_>],
) -> Result<Vec<u8>, TicketError> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        format!("Tickets {order_number}"),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "ticket",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| TicketError::Pdf(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| TicketError::Pdf(e.to_string()))?;

    for (index, ticket) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "ticket");
            doc.get_page(page).get_layer(layer)
        };

        let mut cursor = PAGE_HEIGHT_MM - 26.0;
        layer.use_text(ticket.event_name, 20.0, Mm(MARGIN_MM), Mm(cursor), &bold);
        cursor -= 9.0;
        layer.use_text(
            format!("{}, {}", ticket.venue, ticket.city),
            11.0,
            Mm(MARGIN_MM),
            Mm(cursor),
            &regular,
        );
        cursor -= 7.0;
        layer.use_text(ticket.starts_at, 11.0, Mm(MARGIN_MM), Mm(cursor), &regular);
        cursor -= 12.0;
        layer.use_text(ticket.ticket_type, 14.0, Mm(MARGIN_MM), Mm(cursor), &bold);
        if let Some(name) = ticket.attendee {
            cursor -= 7.0;
            layer.use_text(name, 11.0, Mm(MARGIN_MM), Mm(cursor), &regular);
        }

        let qr_x = (PAGE_WIDTH_MM - QR_SIDE_MM) / 2.0;
        draw_qr(&layer, ticket.qr_payload, qr_x, 52.0, QR_SIDE_MM)?;

        layer.use_text(ticket.ticket_code, 11.0, Mm(MARGIN_MM), Mm(36.0), &bold);
        layer.use_text(order_number, 9.0, Mm(MARGIN_MM), Mm(29.0), &regular);
        layer.use_text(
            "Present this code at the door. Each code admits one person.",
            8.0,
            Mm(MARGIN_MM),
            Mm(20.0),
            &regular,
        );
    }

    doc.save_to_bytes().map_err(|e| TicketError::Pdf(e.to_string()))
}

/// Dark QR modules become filled rectangles. PDF coordinates grow upward while
/// QR rows count from the top, so rows are flipped.
fn draw_qr(
    layer: &PdfLayerReference,
    payload: &str,
    origin_x_mm: f32,
    origin_y_mm: f32,
    side_mm: f32,
) -> Result<(), TicketError> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| TicketError::Qr(e.to_string()))?;
    let width = code.width();
    let colors = code.to_colors();
    let module = side_mm / width as f32;

    layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    for (index, color) in colors.iter().enumerate() {
        if matches!(color, QrColor::Dark) {
            let col = (index % width) as f32;
            let row = (index / width) as f32;
            let x = origin_x_mm + col * module;
            let y = origin_y_mm + (width as f32 - 1.0 - row) * module;
            let rect = Rect::new(Mm(x), Mm(y), Mm(x + module), Mm(y + module))
                .with_mode(PaintMode::Fill);
            layer.add_rect(rect);
        }
    }
    Ok(())
}
