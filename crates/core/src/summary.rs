//! Quote summary
//!
//! Console rendering of the current quote: one line per checked product
//! with its selected tier and totals, a subtotal / total / savings footer,
//! and the approval verdict the discount flags exist to drive.

use std::{fmt::Write, io};

use decimal_percentage::Percentage;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use rusty_money::{
    Money, MoneyError,
    iso::{self, Currency},
};
use tabled::{
    builder::Builder,
    grid::config::HorizontalLine,
    settings::{
        Alignment, Color, Style, Theme,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    book::{FieldKey, PriceBook},
    totals,
};

/// Errors that can occur when building a quote summary.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// The book's currency code is not a known ISO currency.
    #[error("unknown currency code {0:?}")]
    UnknownCurrency(String),

    /// Wrapper for money errors.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// IO error
    #[error("IO error")]
    IO,
}

/// One product line of the summary table.
#[derive(Debug, Clone)]
struct SummaryLine {
    product: String,
    tier: Option<String>,
    list_total: Option<Decimal>,
    discounted_total: Option<Decimal>,
    discount_percent: Option<Decimal>,
    over_ceiling: bool,
}

/// A rendered view over a price book's checked products.
#[derive(Debug, Clone)]
pub struct QuoteSummary {
    lines: Vec<SummaryLine>,

    /// Sum of the checked products' list totals.
    subtotal: Money<'static, Currency>,

    /// Sum of the checked products' discounted totals.
    total: Money<'static, Currency>,

    /// Whether any cell in the book carries a ceiling violation.
    escalation_required: bool,

    currency: &'static Currency,
}

impl QuoteSummary {
    /// Build a summary from the book's checked products.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::UnknownCurrency`] when the book's currency
    /// code is not a known ISO code.
    pub fn from_book(book: &PriceBook) -> Result<Self, SummaryError> {
        let currency = iso::find(&book.currency)
            .ok_or_else(|| SummaryError::UnknownCurrency(book.currency.clone()))?;

        let mut subtotal = Decimal::ZERO;
        let mut total = Decimal::ZERO;
        let mut lines = Vec::new();

        for product in book.checked_products() {
            let list_total = product
                .total(FieldKey::ListTotalPrice)
                .and_then(|cell| cell.value);
            let discounted_total = product
                .total(FieldKey::DiscountedTotalPrice)
                .and_then(|cell| cell.value);
            let discount = product.total(FieldKey::Discount);

            subtotal += list_total.unwrap_or_default();
            total += discounted_total.unwrap_or_default();

            lines.push(SummaryLine {
                product: product.name.clone(),
                tier: product
                    .checked_tiers()
                    .next()
                    .map(|tier| tier.name.clone()),
                list_total,
                discounted_total,
                discount_percent: discount.and_then(|cell| cell.value),
                over_ceiling: discount.is_some_and(|cell| cell.error),
            });
        }

        Ok(Self {
            lines,
            subtotal: Money::from_decimal(subtotal, currency),
            total: Money::from_decimal(total, currency),
            escalation_required: totals::escalation_required(book),
            currency,
        })
    }

    /// Sum of the checked products' list totals.
    #[must_use]
    pub fn subtotal(&self) -> Money<'static, Currency> {
        self.subtotal
    }

    /// Sum of the checked products' discounted totals.
    #[must_use]
    pub fn total(&self) -> Money<'static, Currency> {
        self.total
    }

    /// The amount the quote saves against list pricing.
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if the subtraction operation fails.
    pub fn savings(&self) -> Result<Money<'static, Currency>, MoneyError> {
        self.subtotal.sub(self.total)
    }

    /// The savings as a fraction of the list subtotal.
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if the subtraction operation fails.
    pub fn savings_percent(&self) -> Result<Percentage, MoneyError> {
        let savings = self.savings()?;

        let savings_minor = savings.to_minor_units();
        let subtotal_minor = self.subtotal.to_minor_units();

        if subtotal_minor == 0 {
            return Ok(Percentage::from(0.0));
        }

        let savings_dec = Decimal::from_i64(savings_minor).unwrap_or(Decimal::ZERO);
        let subtotal_dec = Decimal::from_i64(subtotal_minor).unwrap_or(Decimal::ZERO);

        Ok(Percentage::from(savings_dec / subtotal_dec))
    }

    /// Whether the quote needs the approval workflow escalated.
    #[must_use]
    pub const fn escalation_required(&self) -> bool {
        self.escalation_required
    }

    /// The currency the summary is priced in.
    #[must_use]
    pub const fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Prints the summary table and footer to the console.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary cannot be printed.
    pub fn write_to(&self, mut out: impl io::Write) -> Result<(), SummaryError> {
        let mut builder = Builder::default();
        let mut color_ops: Vec<(usize, usize, Color)> = Vec::new();

        builder.push_record([
            "Product",
            "Tier",
            "List Total",
            "Discounted Total",
            "Discount",
            "Policy",
        ]);

        for (idx, line) in self.lines.iter().enumerate() {
            let row = idx + 1;
            let saving = line
                .discount_percent
                .is_some_and(|percent| !percent.is_zero());

            builder.push_record([
                line.product.clone(),
                line.tier.clone().unwrap_or_default(),
                self.money_cell(line.list_total),
                self.money_cell(line.discounted_total),
                percent_cell(line.discount_percent),
                if line.over_ceiling {
                    "over ceiling".to_owned()
                } else {
                    String::new()
                },
            ]);

            color_ops.push((row, 1, color_dark_grey()));

            if saving {
                color_ops.push((row, 3, Color::FG_GREEN));
            }

            if line.over_ceiling {
                color_ops.push((row, 5, Color::FG_RED));
            }
        }

        let mut table = builder.build();
        let mut theme = Theme::from(Style::modern_rounded());
        let separator = HorizontalLine::new(Some('─'), Some('┼'), Some('├'), Some('┤'));

        theme.remove_horizontal_lines();
        theme.insert_horizontal_line(1, separator);

        table.with(theme);
        table.modify(Rows::first(), Color::BOLD);
        table.modify(Columns::new(2..5), Alignment::right());

        for (row, col, color) in color_ops {
            table.modify((row, col), color);
        }

        let table_str = colorize_borders(&table.to_string());
        writeln!(out, "\n{table_str}").map_err(|_err| SummaryError::IO)?;

        self.write_footer(&mut out)
    }

    fn money_cell(&self, value: Option<Decimal>) -> String {
        value
            .map(|value| Money::from_decimal(value, self.currency).to_string())
            .unwrap_or_default()
    }

    fn write_footer(&self, out: &mut impl io::Write) -> Result<(), SummaryError> {
        let savings = self.savings()?;
        let savings_percent_points = percent_points(self.savings_percent()?);

        let subtotal_label = " Subtotal:";
        let total_label = " \x1b[1mTotal:\x1b[0m";
        let savings_label = " Savings:";
        let approval_label = " Approval:";

        let subtotal_val = format!("{}  ", self.subtotal);
        let total_val = format!("{}  ", self.total);
        let savings_val = format!("({savings_percent_points:.2}%) {savings}  ");
        let approval_val = if self.escalation_required {
            "\x1b[31mescalation required\x1b[0m  ".to_owned()
        } else {
            "within policy  ".to_owned()
        };

        let label_width = visible_width(subtotal_label)
            .max(visible_width(total_label))
            .max(visible_width(savings_label))
            .max(visible_width(approval_label));

        let value_width = subtotal_val
            .len()
            .max(total_val.len())
            .max(savings_val.len());

        write_footer_line(out, subtotal_label, &subtotal_val, label_width, value_width)?;

        write_footer_line(
            out,
            total_label,
            &format!("\x1b[1m{total_val}\x1b[0m"),
            label_width,
            value_width,
        )?;

        write_footer_line(out, savings_label, &savings_val, label_width, value_width)?;
        write_footer_line(out, approval_label, &approval_val, label_width, value_width)?;

        writeln!(out).map_err(|_err| SummaryError::IO)
    }
}

fn percent_cell(value: Option<Decimal>) -> String {
    value.map(|value| format!("{value}%")).unwrap_or_default()
}

/// Converts a fractional percentage to percent points for display.
fn percent_points(percentage: Percentage) -> Decimal {
    // `Percentage` is a fraction (e.g. 0.25), so multiply by 100 to print percent points.
    ((percentage * Decimal::ONE) * Decimal::from_i64(100).unwrap_or(Decimal::ZERO)).round_dp(2)
}

/// Wraps runs of UTF-8 box-drawing characters in ANSI dark-grey escape codes.
///
/// Box-drawing characters occupy the Unicode range U+2500..U+257F. This
/// function scans each character, grouping consecutive border characters and
/// emitting a single grey escape sequence around each run, leaving cell
/// content untouched.
fn colorize_borders(table: &str) -> String {
    let mut out = String::with_capacity(table.len() + 256);
    let mut in_run = false;

    for ch in table.chars() {
        let box_char = ('\u{2500}'..='\u{257F}').contains(&ch);

        if box_char && !in_run {
            _ = out.write_str("\x1b[90m");
            in_run = true;
        } else if !box_char && in_run {
            _ = out.write_str("\x1b[0m");
            in_run = false;
        }

        out.push(ch);
    }

    if in_run {
        _ = out.write_str("\x1b[0m");
    }

    out
}

/// Returns the visible (non-ANSI) width of a string.
fn visible_width(s: &str) -> usize {
    let mut width = 0usize;
    let mut in_escape = false;

    for ch in s.chars() {
        if in_escape {
            if ch.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if ch == '\x1b' {
            in_escape = true;
        } else {
            width += 1;
        }
    }

    width
}

/// Writes a footer line with a right-aligned label and a fixed-width value
/// column.
fn write_footer_line(
    out: &mut impl io::Write,
    label: &str,
    value: &str,
    label_col_width: usize,
    value_col_width: usize,
) -> Result<(), SummaryError> {
    let label_vis = visible_width(label);
    let value_vis = visible_width(value);

    // 2 chars of spacing between label and value column.
    let label_pad = label_col_width.saturating_sub(label_vis);
    let value_pad = value_col_width.saturating_sub(value_vis);

    writeln!(
        out,
        "{:>label_pad$}{label}  {value_pad}{value}",
        "",
        value_pad = " ".repeat(value_pad)
    )
    .map_err(|_err| SummaryError::IO)
}

/// ANSI dark grey foreground.
fn color_dark_grey() -> Color {
    Color::new("\x1b[90m", "\x1b[0m")
}
