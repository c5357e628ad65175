use crate::error::AppError;

/// Parse a header string in format "Name: Value"
fn parse_header(header_str: &str) -> Result<(String, String), AppError> {
    // The first colon separates name and value
    let Some((name, value)) = header_str.split_once(':') else {
        return Err(AppError::InvalidInput(format!(
            "Invalid header format: '{header_str}'. Expected 'Name: Value'"
        )));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "Invalid header format: '{header_str}'. Header name is empty"
        )));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse a collection of header strings into name/value pairs.
///
/// Name and value validity is checked when the service configuration is built.
pub fn parse_headers(header_strings: &[String]) -> Result<Vec<(String, String)>, AppError> {
    header_strings.iter().map(|h| parse_header(h)).collect()
}
