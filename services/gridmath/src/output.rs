//! Output variable format selection.

use anyhow::{bail, Context, Result};
use chunk_engine::{ChunkFormat, DataType, PackingScheme};

/// Scale/offset used for packed output when none is given.
pub const DEFAULT_SCALE: &str = "0.01/0";

/// Storage type used for output when neither a size nor a template is given.
pub const DEFAULT_SIZE: &str = "short";

/// Requested output encoding. Unset fields fall back to the template
/// variable's format, then to a packed short.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRequest {
    pub size: Option<String>,
    pub unsigned: bool,
    pub scale: Option<String>,
    pub missing: Option<String>,
}

/// Parse a storage size such as `short` or `ubyte` into its type and
/// unsigned flag.
pub fn parse_size(text: &str) -> Result<(DataType, bool)> {
    let lower = text.trim().to_lowercase();
    if let Some(data_type) = DataType::from_str(&lower) {
        return Ok((data_type, false));
    }
    match lower.strip_prefix('u').and_then(DataType::from_str) {
        Some(data_type) if data_type.is_integral() => Ok((data_type, true)),
        _ => bail!(
            "invalid size '{text}', expected byte, ubyte, short, ushort, int, uint, long, ulong, float or double"
        ),
    }
}

/// Parse `FACTOR/OFFSET` or `none`.
pub fn parse_scale(text: &str) -> Result<Option<PackingScheme>> {
    if text.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let packing = PackingScheme::parse(text, DataType::Double)
        .with_context(|| format!("invalid scale '{text}'"))?;
    Ok(Some(packing))
}

impl OutputRequest {
    /// Build the output chunk format.
    pub fn resolve(&self, template: Option<&ChunkFormat>) -> Result<ChunkFormat> {
        let (storage, unsigned, inherited) = match (&self.size, template) {
            (Some(size), _) => {
                let (storage, unsigned) = parse_size(size)?;
                (storage, unsigned, None)
            }
            (None, Some(template)) => (template.storage, template.unsigned, Some(template)),
            (None, None) => {
                let (storage, unsigned) = parse_size(DEFAULT_SIZE)?;
                (storage, unsigned, None)
            }
        };
        let unsigned = (unsigned || self.unsigned) && storage.is_integral();

        let packing = if storage.is_floating() {
            None
        } else {
            match (&self.scale, inherited) {
                (Some(scale), _) => parse_scale(scale)?,
                (None, Some(template)) => template.packing,
                (None, None) => parse_scale(DEFAULT_SCALE)?,
            }
        };

        let missing = match (&self.missing, inherited) {
            (Some(text), _) => {
                let value: f64 = text
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid missing value '{text}'"))?;
                if value.is_nan() {
                    None
                } else {
                    Some(value)
                }
            }
            (None, Some(template)) if template.unsigned == unsigned => template.missing,
            _ => storage.default_missing(unsigned),
        };

        let format = ChunkFormat::new(storage)
            .with_unsigned(unsigned)
            .with_packing(packing)
            .with_missing(missing);
        format
            .validate()
            .with_context(|| format!("unusable output format {format}"))?;
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_packed_short() {
        let format = OutputRequest::default().resolve(None).unwrap();
        assert_eq!(format.storage, DataType::Short);
        assert!(!format.unsigned);
        assert_eq!(format.missing, Some(i16::MIN as f64));
        let packing = format.packing.unwrap();
        assert_eq!(packing.scale, 0.01);
        assert_eq!(packing.offset, 0.0);
        assert_eq!(format.external_type(), DataType::Double);
    }

    #[test]
    fn test_unsigned_prefix() {
        assert_eq!(parse_size("ubyte").unwrap(), (DataType::Byte, true));
        assert_eq!(parse_size("Int").unwrap(), (DataType::Int, false));
        assert!(parse_size("ufloat").is_err());
        assert!(parse_size("quad").is_err());

        let request = OutputRequest {
            size: Some("ushort".into()),
            scale: Some("none".into()),
            ..Default::default()
        };
        let format = request.resolve(None).unwrap();
        assert!(format.unsigned);
        assert_eq!(format.missing, Some(0.0));
        assert_eq!(format.packing, None);
        assert_eq!(format.external_type(), DataType::Int);
    }

    #[test]
    fn test_floating_ignores_scale() {
        let request = OutputRequest {
            size: Some("float".into()),
            scale: Some("0.5/10".into()),
            unsigned: true,
            ..Default::default()
        };
        let format = request.resolve(None).unwrap();
        assert_eq!(format.packing, None);
        assert_eq!(format.missing, None);
        assert!(!format.unsigned);
    }

    #[test]
    fn test_template_supplies_unset_fields() {
        let template = ChunkFormat::new(DataType::Byte)
            .with_unsigned(true)
            .with_missing(Some(255.0))
            .with_packing(Some(PackingScheme::new(0.5, 0.0, DataType::Float).unwrap()));

        let format = OutputRequest::default().resolve(Some(&template)).unwrap();
        assert_eq!(format, template);

        let request = OutputRequest {
            missing: Some("254".into()),
            ..Default::default()
        };
        assert_eq!(request.resolve(Some(&template)).unwrap().missing, Some(254.0));

        let request = OutputRequest {
            size: Some("int".into()),
            ..Default::default()
        };
        let format = request.resolve(Some(&template)).unwrap();
        assert_eq!(format.missing, Some(i32::MIN as f64));
        assert_eq!(format.packing.unwrap().scale, 0.01);
    }

    #[test]
    fn test_bad_scale_and_missing() {
        let request = OutputRequest {
            scale: Some("0/1".into()),
            ..Default::default()
        };
        assert!(request.resolve(None).is_err());

        let request = OutputRequest {
            missing: Some("lots".into()),
            ..Default::default()
        };
        assert!(request.resolve(None).is_err());
    }
}
