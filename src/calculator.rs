//! Loan pricing arithmetic in Namibian dollars.
//!
//! All money is `rust_decimal::Decimal` so quotes are exact to the cent. The
//! consumer calculator (15% once-off interest plus statutory fees) and the
//! monthly-rate origination pricing used when a loan record is opened both
//! live here, together with the one-third-of-salary affordability rules.

use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use serde::Serialize;
use thiserror::Error;

/// Decimal literal usable in const context: `dec(25, 1)` is 2.5.
const fn dec(num: i64, scale: u32) -> Decimal {
    Decimal::from_parts(num.unsigned_abs() as u32, 0, 0, num < 0, scale)
}

/// Once-off interest, percent of principal
pub const INTEREST_RATE: Decimal = dec(15, 0);
/// NAMFISA levy, percent of principal
pub const NAMFISA_LEVY_RATE: Decimal = dec(4, 0);
/// Fixed stamp duty
pub const STAMP_DUTY: Decimal = dec(15, 0);
pub const MIN_LOAN_AMOUNT: Decimal = dec(500, 0);
pub const MAX_LOAN_AMOUNT: Decimal = dec(10_000, 0);
pub const MIN_LOAN_TERM: i64 = 1;
pub const MAX_LOAN_TERM: i64 = 5;

const PROCESSING_FEE_RATE: Decimal = dec(1, 2);
const PROCESSING_FEE_MIN: Decimal = dec(20, 0);
const PROCESSING_FEE_MAX: Decimal = dec(100, 0);

/// Origination pricing: monthly rate in percent
const BASE_MONTHLY_RATE: Decimal = dec(25, 1);
const RATE_STEP: Decimal = dec(5, 1);
const MIN_MONTHLY_RATE: Decimal = dec(15, 1);
const MAX_MONTHLY_RATE: Decimal = dec(50, 1);
const LOW_INCOME: Decimal = dec(5_000, 0);
const HIGH_INCOME: Decimal = dec(15_000, 0);
const LARGE_LOAN: Decimal = dec(10_000, 0);

/// Eligibility: share of salary available for repayments, default term
const AFFORDABILITY_SHARE: Decimal = dec(33, 2);
const ELIGIBILITY_TERM_MONTHS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculatorError {
    #[error("Loan amount cannot be negative")]
    NegativeAmount,

    #[error("Total payable cannot be negative")]
    NegativeTotal,

    #[error("Term months must be greater than 0")]
    NonPositiveTerm,

    #[error("Monthly salary must be greater than 0")]
    NonPositiveSalary,

    /// Amount or term outside the product range; carries the validation message
    #[error("{0}")]
    OutOfRange(String),

    #[error("Amount is too large to calculate")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeBreakdown {
    pub processing_fee: Decimal,
    pub namfisa_levy: Decimal,
    pub stamp_duty: Decimal,
    pub total_fees: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanDetails {
    pub loan_amount: Decimal,
    pub loan_term_months: i64,
    pub buffr_fee_rate: Decimal,
    pub buffr_fee_amount: Decimal,
    pub user_total_fees: Decimal,
    pub total_payable: Decimal,
    pub monthly_payment: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalaryCompliance {
    pub is_compliant: bool,
    pub max_loan_amount: Decimal,
    pub compliance_percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountValidation {
    pub is_valid: bool,
    pub error: Option<String>,
    pub corrected_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermValidation {
    pub is_valid: bool,
    pub error: Option<String>,
    pub corrected_term: i64,
}

/// Flat-rate pricing attached to a new loan record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginationQuote {
    /// Monthly rate in percent
    pub interest_rate: Decimal,
    pub total_amount: Decimal,
    pub monthly_payment: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Eligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Decimal>,
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal, CalculatorError> {
    a.checked_add(b).ok_or(CalculatorError::Overflow)
}

fn sub(a: Decimal, b: Decimal) -> Result<Decimal, CalculatorError> {
    a.checked_sub(b).ok_or(CalculatorError::Overflow)
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal, CalculatorError> {
    a.checked_mul(b).ok_or(CalculatorError::Overflow)
}

fn div(a: Decimal, b: Decimal) -> Result<Decimal, CalculatorError> {
    a.checked_div(b).ok_or(CalculatorError::Overflow)
}

fn percent_of(amount: Decimal, rate: Decimal) -> Result<Decimal, CalculatorError> {
    div(mul(amount, rate)?, Decimal::ONE_HUNDRED)
}

pub fn calculate_interest(loan_amount: Decimal) -> Result<Decimal, CalculatorError> {
    if loan_amount < Decimal::ZERO {
        return Err(CalculatorError::NegativeAmount);
    }
    percent_of(loan_amount, INTEREST_RATE)
}

pub fn calculate_fees(loan_amount: Decimal) -> Result<FeeBreakdown, CalculatorError> {
    if loan_amount < Decimal::ZERO {
        return Err(CalculatorError::NegativeAmount);
    }

    let processing_fee = mul(loan_amount, PROCESSING_FEE_RATE)?.clamp(PROCESSING_FEE_MIN, PROCESSING_FEE_MAX);
    let namfisa_levy = percent_of(loan_amount, NAMFISA_LEVY_RATE)?;
    let stamp_duty = STAMP_DUTY;

    Ok(FeeBreakdown {
        processing_fee,
        namfisa_levy,
        stamp_duty,
        total_fees: add(add(processing_fee, namfisa_levy)?, stamp_duty)?,
    })
}

pub fn calculate_monthly_payment(total_payable: Decimal, term_months: Decimal) -> Result<Decimal, CalculatorError> {
    if total_payable < Decimal::ZERO {
        return Err(CalculatorError::NegativeTotal);
    }
    if term_months <= Decimal::ZERO {
        return Err(CalculatorError::NonPositiveTerm);
    }
    div(total_payable, term_months)
}

/// Full consumer quote. Amount and term are validated first and the
/// validation message becomes the error.
pub fn calculate_loan_details(loan_amount: Decimal, term_months: Decimal) -> Result<LoanDetails, CalculatorError> {
    let amount_check = validate_loan_amount(loan_amount);
    if !amount_check.is_valid {
        return Err(CalculatorError::OutOfRange(
            amount_check.error.unwrap_or_else(|| "Invalid loan amount".to_string()),
        ));
    }

    let term_check = validate_loan_term(term_months);
    if !term_check.is_valid {
        return Err(CalculatorError::OutOfRange(
            term_check.error.unwrap_or_else(|| "Invalid loan term".to_string()),
        ));
    }

    let interest = calculate_interest(loan_amount)?;
    let fees = calculate_fees(loan_amount)?;
    let total_payable = add(add(loan_amount, interest)?, fees.total_fees)?;
    let monthly_payment = calculate_monthly_payment(total_payable, term_months)?;

    Ok(LoanDetails {
        loan_amount,
        loan_term_months: term_check.corrected_term,
        buffr_fee_rate: INTEREST_RATE,
        buffr_fee_amount: interest,
        user_total_fees: fees.total_fees,
        total_payable,
        monthly_payment,
    })
}

/// One-third rule: a loan may not exceed a third of the monthly salary.
pub fn validate_salary_compliance(loan_amount: Decimal, monthly_salary: Decimal) -> Result<SalaryCompliance, CalculatorError> {
    if loan_amount < Decimal::ZERO {
        return Err(CalculatorError::NegativeAmount);
    }
    if monthly_salary <= Decimal::ZERO {
        return Err(CalculatorError::NonPositiveSalary);
    }

    let max_loan_amount = div(monthly_salary, Decimal::from(3))?;
    Ok(SalaryCompliance {
        is_compliant: loan_amount <= max_loan_amount,
        max_loan_amount,
        compliance_percentage: mul(div(loan_amount, monthly_salary)?, Decimal::ONE_HUNDRED)?,
    })
}

pub fn validate_loan_amount(amount: Decimal) -> AmountValidation {
    if amount < MIN_LOAN_AMOUNT {
        return AmountValidation {
            is_valid: false,
            error: Some(format!("Loan amount must be at least N${}", MIN_LOAN_AMOUNT)),
            corrected_amount: MIN_LOAN_AMOUNT,
        };
    }
    if amount > MAX_LOAN_AMOUNT {
        return AmountValidation {
            is_valid: false,
            error: Some(format!("Loan amount cannot exceed N${}", MAX_LOAN_AMOUNT)),
            corrected_amount: MAX_LOAN_AMOUNT,
        };
    }
    AmountValidation {
        is_valid: true,
        error: None,
        corrected_amount: amount,
    }
}

pub fn validate_loan_term(term: Decimal) -> TermValidation {
    if !term.fract().is_zero() {
        let rounded = term.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        return TermValidation {
            is_valid: false,
            error: Some("Loan term must be a whole number".to_string()),
            corrected_term: rounded.to_i64().unwrap_or(MIN_LOAN_TERM),
        };
    }

    // Whole but possibly huge: saturate instead of failing the conversion
    let whole = term.to_i64().unwrap_or(if term.is_sign_negative() { i64::MIN } else { i64::MAX });
    if whole < MIN_LOAN_TERM {
        return TermValidation {
            is_valid: false,
            error: Some(format!("Loan term must be at least {} month", MIN_LOAN_TERM)),
            corrected_term: MIN_LOAN_TERM,
        };
    }
    if whole > MAX_LOAN_TERM {
        return TermValidation {
            is_valid: false,
            error: Some(format!("Loan term cannot exceed {} months", MAX_LOAN_TERM)),
            corrected_term: MAX_LOAN_TERM,
        };
    }
    TermValidation {
        is_valid: true,
        error: None,
        corrected_term: whole,
    }
}

/// `N$` followed by the amount grouped in thousands with at most two decimals.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let text = rounded.abs().to_string();
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    match fraction {
        Some(f) => format!("N${}{}.{}", sign, grouped, f),
        None => format!("N${}{}", sign, grouped),
    }
}

/// Monthly origination rate (percent) from the risk adjustments, clamped to 1.5..=5.
pub fn origination_rate(amount: Decimal, monthly_income: Decimal) -> Decimal {
    let mut rate = BASE_MONTHLY_RATE;

    if monthly_income < LOW_INCOME {
        rate += RATE_STEP;
    } else if monthly_income > HIGH_INCOME {
        rate -= RATE_STEP;
    }
    if amount > LARGE_LOAN {
        rate += RATE_STEP;
    }

    rate.clamp(MIN_MONTHLY_RATE, MAX_MONTHLY_RATE)
}

pub fn origination_quote(amount: Decimal, term_months: i32, monthly_income: Decimal) -> Result<OriginationQuote, CalculatorError> {
    if amount < Decimal::ZERO {
        return Err(CalculatorError::NegativeAmount);
    }
    if term_months <= 0 {
        return Err(CalculatorError::NonPositiveTerm);
    }

    let interest_rate = origination_rate(amount, monthly_income);
    let term = Decimal::from(term_months);
    let growth = add(Decimal::ONE, mul(div(interest_rate, Decimal::ONE_HUNDRED)?, term)?)?;
    let total_amount = mul(amount, growth)?;

    Ok(OriginationQuote {
        interest_rate,
        total_amount,
        monthly_payment: div(total_amount, term)?,
    })
}

/// Affordability check against existing monthly obligations.
///
/// The proposed payment uses the base 2.5% monthly rate over three months.
/// When the combined payments exceed 33% of salary the largest affordable
/// whole amount is reported, never below zero.
pub fn check_eligibility(
    current_monthly_payments: Decimal,
    loan_amount: Decimal,
    monthly_salary: Decimal,
) -> Result<Eligibility, CalculatorError> {
    let term = Decimal::from(ELIGIBILITY_TERM_MONTHS);
    let growth = add(Decimal::ONE, mul(div(BASE_MONTHLY_RATE, Decimal::ONE_HUNDRED)?, term)?)?;
    let proposed_monthly = div(mul(loan_amount, growth)?, term)?;

    let max_monthly = mul(monthly_salary, AFFORDABILITY_SHARE)?;
    if add(current_monthly_payments, proposed_monthly)? > max_monthly {
        let headroom = sub(max_monthly, current_monthly_payments)?;
        let max_amount = div(mul(headroom, term)?, growth)?.floor();
        return Ok(Eligibility {
            eligible: false,
            reason: Some("Monthly payment would exceed 1/3 of your salary".to_string()),
            max_amount: Some(max_amount.max(Decimal::ZERO)),
        });
    }

    Ok(Eligibility {
        eligible: true,
        reason: None,
        max_amount: None,
    })
}
