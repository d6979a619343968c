//! Ticket artifacts: codes, QR payloads, and QR PNGs for email embedding.

pub mod pdf;

use rand::Rng;

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("QR encoding failed: {0}")]
    Qr(String),
    #[error("PNG encoding failed: {0}")]
    Png(String),
    #[error("PDF rendering failed: {0}")]
    Pdf(String),
}

/// Support-friendly ticket code: `SHP-<base36 millis>-<base36 random>`,
/// lowercase. Uniqueness is backstopped by the UNIQUE column; a collision
/// regenerates.
pub fn generate_ticket_code(now_millis: i64) -> String {
    // 36^6 distinct suffixes
    let random: u32 = rand::thread_rng().gen_range(0..2_176_782_336);
    format!(
        "SHP-{}-{}",
        base36(now_millis.max(0) as u64),
        base36(random as u64)
    )
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    // SAFETY: only ASCII digits and lowercase letters are pushed
    String::from_utf8(out).expect("base36 output is ASCII")
}

/// The JSON a door scanner reads from the QR code.
pub fn qr_payload(
    order_number: &str,
    ticket_code: &str,
    event_slug: &str,
    ticket_type: &str,
) -> String {
    serde_json::json!({
        "kind": "ticket",
        "orderNumber": order_number,
        "ticketCode": ticket_code,
        "eventSlug": event_slug,
        "ticketType": ticket_type,
    })
    .to_string()
}

/// Pixels per QR module in the rendered PNG.
const SCALE: u32 = 8;
/// Quiet-zone border, in modules, on every side.
const QUIET: u32 = 4;

/// Render the payload as a grayscale QR PNG.
pub fn qr_png(payload: &str) -> Result<Vec<u8>, TicketError> {
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder, Luma};
    use qrcode::{Color, QrCode};

    let code = QrCode::new(payload.as_bytes()).map_err(|e| TicketError::Qr(e.to_string()))?;
    let width = code.width();
    let colors = code.to_colors();

    let size = (width as u32 + 2 * QUIET) * SCALE;
    let mut img = image::GrayImage::from_pixel(size, size, Luma([255u8]));
    for (index, color) in colors.iter().enumerate() {
        if matches!(color, Color::Dark) {
            let module_x = (index % width) as u32 + QUIET;
            let module_y = (index / width) as u32 + QUIET;
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    img.put_pixel(module_x * SCALE + dx, module_y * SCALE + dy, Luma([0u8]));
                }
            }
        }
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(img.as_raw(), size, size, ExtendedColorType::L8)
        .map_err(|e| TicketError::Png(e.to_string()))?;
    Ok(png)
}
