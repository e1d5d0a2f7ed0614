use clap::Parser;
use loader::TargetSize;
use std::path::PathBuf;

/// Fetch a remote image through the resizable image loader and save it as PNG
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "resizable-image-fetch", version, about)]
pub struct Args {
    /// Image URL
    pub url: String,

    /// Logical target size; the image is decoded as a thumbnail bounded by it
    #[arg(long = "size", value_name = "WxH", value_parser = parse_size)]
    pub target_size: Option<TargetSize>,

    /// Device scale factor, overriding the configured one
    #[arg(long, value_name = "S", value_parser = parse_scale)]
    pub scale: Option<f64>,

    /// Where to write the PNG
    #[arg(long, value_name = "PATH", default_value = "image.png")]
    pub out: PathBuf,

    /// Persist the effective configuration (including --scale) to the user config file
    #[arg(long)]
    pub save_config: bool,
}

pub fn parse_size(value: &str) -> Result<TargetSize, String> {
    let invalid = || format!("invalid size '{value}', expected WxH");
    let (width, height) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = parse_dimension(width).ok_or_else(invalid)?;
    let height = parse_dimension(height).ok_or_else(invalid)?;
    Ok(TargetSize::new(width, height))
}

fn parse_dimension(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|dimension| dimension.is_finite() && *dimension >= 0.0)
}

pub fn parse_scale(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|scale| scale.is_finite() && *scale > 0.0)
        .ok_or_else(|| format!("invalid scale '{value}', expected a positive number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        let argv = std::iter::once(&"resizable-image-fetch").chain(args);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_url_only() {
        let args = parse(&["https://example.com/a.png"]).unwrap();
        assert_eq!(args.url, "https://example.com/a.png");
        assert_eq!(args.target_size, None);
        assert_eq!(args.scale, None);
        assert_eq!(args.out, PathBuf::from("image.png"));
        assert!(!args.save_config);
    }

    #[test]
    fn test_all_options() {
        let args = parse(&[
            "--size",
            "100x50",
            "https://example.com/a.png",
            "--scale",
            "2",
            "--out",
            "thumb.png",
            "--save-config",
        ])
        .unwrap();
        assert_eq!(args.target_size, Some(TargetSize::new(100.0, 50.0)));
        assert_eq!(args.scale, Some(2.0));
        assert_eq!(args.out, PathBuf::from("thumb.png"));
        assert!(args.save_config);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse(&[]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse(&["u", "--size"]).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            parse(&["u", "--size", "big"]).unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse(&["u", "--scale", "0"]).unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse(&["u", "v"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
    }

    #[test]
    fn test_usage_errors_exit_with_two() {
        assert_eq!(parse(&[]).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn test_value_parsers() {
        assert_eq!(parse_size("64X32.5"), Ok(TargetSize::new(64.0, 32.5)));
        assert!(parse_size("-1x10").is_err());
        assert!(parse_size("10x").is_err());
        assert_eq!(parse_scale("1.5"), Ok(1.5));
        assert!(parse_scale("-2").is_err());
        assert!(parse_scale("inf").is_err());
    }
}
