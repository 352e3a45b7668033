//! Rendering transport frames into PNG QR codes.

use std::io::Cursor;

use data_encoding::BASE64;
use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode, Version, bits::Bits};
use uos_util::result_ext::ResultExt as _;

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum QrErrorCorrection {
    Low,
    #[default]
    Medium,
    Quartile,
    High,
}

impl From<QrErrorCorrection> for EcLevel {
    fn from(level: QrErrorCorrection) -> Self {
        match level {
            QrErrorCorrection::Low => EcLevel::L,
            QrErrorCorrection::Medium => EcLevel::M,
            QrErrorCorrection::Quartile => EcLevel::Q,
            QrErrorCorrection::High => EcLevel::H,
        }
    }
}

/// One rendered QR code
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct QrImage {
    /// `data:image/png;base64,...`
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum QrImageError {
    #[error("data is too long for a single qr code: {0} bytes")]
    DataTooLong(u32),

    #[error("unable to build qr code: {0}")]
    QrCode(String),

    #[error("unable to encode png: {0}")]
    Png(String),
}

type Error = QrImageError;

/// The smallest byte mode code that fits `data`
pub fn byte_mode_code(data: &[u8], error_correction: QrErrorCorrection) -> Result<QrCode, Error> {
    let ec_level = EcLevel::from(error_correction);

    for version in 1..=40 {
        let mut bits = Bits::new(Version::Normal(version));
        if bits.push_byte_data(data).is_err() || bits.push_terminator(ec_level).is_err() {
            continue;
        }

        return QrCode::with_bits(bits, ec_level).map_err_str(Error::QrCode);
    }

    Err(Error::DataTooLong(data.len() as u32))
}

/// Render `data` as a grayscale PNG data uri
pub fn render(
    data: &[u8],
    error_correction: QrErrorCorrection,
    module_size: u32,
    quiet_zone: bool,
) -> Result<QrImage, Error> {
    let code = byte_mode_code(data, error_correction)?;

    let image = code
        .render::<Luma<u8>>()
        .quiet_zone(quiet_zone)
        .module_dimensions(module_size.max(1), module_size.max(1))
        .build();

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).map_err_str(Error::Png)?;

    Ok(QrImage {
        data_uri: format!("{DATA_URI_PREFIX}{}", BASE64.encode(&png)),
        width: image.width(),
        height: image.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_small_payload_uses_version_one() {
        let code = byte_mode_code(b"hello", QrErrorCorrection::Medium).unwrap();
        assert_eq!(code.version(), Version::Normal(1));
    }

    #[test]
    fn test_version_grows_with_data() {
        let code = byte_mode_code(&[0xab; 1029], QrErrorCorrection::Medium).unwrap();
        assert!(matches!(code.version(), Version::Normal(version) if version > 20));
    }

    #[test]
    fn test_too_long() {
        let result = byte_mode_code(&[0u8; 4000], QrErrorCorrection::High);
        assert_eq!(result.err(), Some(QrImageError::DataTooLong(4000)));
    }

    #[test]
    fn test_render_is_deterministic() {
        let first = render(&[0x53, 0x01, 0x02], QrErrorCorrection::Medium, 2, false).unwrap();
        let second = render(&[0x53, 0x01, 0x02], QrErrorCorrection::Medium, 2, false).unwrap();

        assert_eq!(first, second);
        assert!(first.data_uri.starts_with(DATA_URI_PREFIX));

        // version 1 is 21 modules wide
        assert_eq!(first.width, 42);
        assert_eq!(first.height, 42);
    }

    #[test]
    fn test_quiet_zone_adds_border() {
        let image = render(b"hi", QrErrorCorrection::Low, 1, true).unwrap();
        assert_eq!(image.width, 21 + 8);
    }
}
