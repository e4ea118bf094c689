use clap::Subcommand;
use rust_decimal::Decimal;
use serde_json::json;

use crate::calculator::{self, format_currency};
use crate::cli::utils::output_table;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum CalcCommands {
    #[command(about = "Fees, interest and monthly repayment for a loan")]
    Quote {
        #[arg(help = "Loan amount in N$")]
        amount: Decimal,
        #[arg(help = "Term in months (1-5)")]
        term: Decimal,
    },

    #[command(about = "Check the one-third-of-salary rule")]
    Compliance {
        #[arg(help = "Loan amount in N$")]
        amount: Decimal,
        #[arg(help = "Gross monthly salary in N$")]
        salary: Decimal,
    },
}

pub fn handle(cmd: CalcCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        CalcCommands::Quote { amount, term } => {
            let details = calculator::calculate_loan_details(amount, term)?;
            let fees = calculator::calculate_fees(amount)?;
            let data = json!({ "details": details, "fees": fees });
            let rows = [
                ("Loan amount", format_currency(details.loan_amount)),
                ("Buffr fee", format_currency(details.buffr_fee_amount)),
                ("Other fees", format_currency(fees.total_fees)),
                ("Total payable", format_currency(details.total_payable)),
                ("Monthly payment", format_currency(details.monthly_payment)),
            ];
            output_table(&output_format, &rows, &data)
        }
        CalcCommands::Compliance { amount, salary } => {
            let result = calculator::validate_salary_compliance(amount, salary)?;
            let data = json!(result);
            let rows = [
                ("Compliant", if result.is_compliant { "yes" } else { "no" }.to_string()),
                ("Maximum loan", format_currency(result.max_loan_amount)),
            ];
            output_table(&output_format, &rows, &data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_rejects_out_of_range_amount() {
        let cmd = CalcCommands::Quote {
            amount: Decimal::from(50),
            term: Decimal::from(3),
        };
        assert!(handle(cmd, OutputFormat::Json).is_err());
    }

    #[test]
    fn compliance_prints_for_valid_input() {
        let cmd = CalcCommands::Compliance {
            amount: Decimal::from(1000),
            salary: Decimal::from(9000),
        };
        assert!(handle(cmd, OutputFormat::Text).is_ok());
    }
}
