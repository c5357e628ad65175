use crate::error::AppError;

/// Parse a size with an optional unit (B, KB, MB, GB, TB; 1024-based)
pub fn parse_size(size_str: &str) -> Result<u64, AppError> {
    let size_str = size_str.trim().to_lowercase();

    if size_str.is_empty() {
        return Err(AppError::ParseError(
            "Invalid size: empty string".to_string(),
        ));
    }

    let split = size_str
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size_str.len());
    let (numeric_part, unit_part) = size_str.split_at(split);

    // No unit means bytes
    if unit_part.is_empty() {
        return numeric_part
            .parse::<u64>()
            .map_err(|_| AppError::ParseError(format!("Invalid size: '{size_str}'")));
    }

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid size: '{size_str}'")))?;

    let multiplier: f64 = match unit_part.trim() {
        "b" => 1.0,
        "kb" | "k" => 1024.0,
        "mb" | "m" => 1024.0 * 1024.0,
        "gb" | "g" => 1024.0 * 1024.0 * 1024.0,
        "tb" | "t" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        unit => {
            return Err(AppError::ParseError(format!("Invalid size unit: '{unit}'")));
        }
    };

    Ok((value * multiplier) as u64)
}
