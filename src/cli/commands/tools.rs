use serde_json::json;

use crate::cli::utils::output_table;
use crate::cli::OutputFormat;
use crate::integrations::google_drive::classify_document;
use crate::services::whatsapp_service::format_phone_number;

pub fn classify(file_name: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let document_type = classify_document(file_name);
    let data = json!({ "file_name": file_name, "document_type": document_type });
    output_table(
        &output_format,
        &[("File", file_name.to_string()), ("Type", document_type.to_string())],
        &data,
    )
}

pub fn phone(number: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let formatted = format_phone_number(number);
    if formatted.len() <= "+264".len() {
        anyhow::bail!("'{}' contains no digits", number);
    }
    let data = json!({ "input": number, "formatted": formatted });
    output_table(&output_format, &[("Formatted", formatted.clone())], &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_needs_digits() {
        assert!(phone("call me", OutputFormat::Text).is_err());
        assert!(phone("081 123 4567", OutputFormat::Json).is_ok());
    }
}
