use crate::utils::error::{Result, ScanError};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ScanError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_ordered_range(field_name: &str, low: u64, high: u64) -> Result<()> {
    if low > high {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: format!("{}..{}", low, high),
            reason: "Lower bound must not exceed upper bound".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("sources.url", "https://www.vinted.de/catalog").is_ok());
        assert!(validate_url("sources.url", "http://localhost:8080").is_ok());
        assert!(validate_url("sources.url", "").is_err());
        assert!(validate_url("sources.url", "invalid-url").is_err());
        assert!(validate_url("sources.url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("scan.max_pages", 3, 1).is_ok());
        assert!(validate_positive_number("scan.max_pages", 0, 1).is_err());
    }

    #[test]
    fn test_validate_ordered_range() {
        assert!(validate_ordered_range("fetcher.delay_ms", 2000, 5000).is_ok());
        assert!(validate_ordered_range("fetcher.delay_ms", 0, 0).is_ok());
        assert!(validate_ordered_range("fetcher.delay_ms", 5000, 2000).is_err());
    }

    #[test]
    fn test_validate_path_and_strings() {
        assert!(validate_path("report.output_path", "./output").is_ok());
        assert!(validate_path("report.output_path", "  ").is_err());
        assert!(validate_non_empty_string("sources.name", "Manga").is_ok());
        assert!(validate_non_empty_string("sources.name", " ").is_err());
    }
}
