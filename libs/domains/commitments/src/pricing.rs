//! Offering price breakdowns.

use crate::models::{
    ChargeFrequency, Offering, OfferingDetails, PaymentOption, PriceQuote, Recommendation,
};

/// Billing hours in an average month
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Share of the total paid upfront under a partial-upfront plan
pub const PARTIAL_UPFRONT_SHARE: f64 = 0.5;

/// Price breakdown of `offering` for the quantity and term in `rec`.
///
/// Totals come from the quoted reserved rate; the split between upfront and
/// recurring follows the recommendation's payment option.
pub fn offering_details(
    offering: &Offering,
    rec: &Recommendation,
    quote: &PriceQuote,
) -> OfferingDetails {
    let months = f64::from(rec.term.months());
    let count = f64::from(rec.count);
    let total_cost = quote.reserved_rate * HOURS_PER_MONTH * months * count;

    let upfront_cost = match rec.payment_option {
        PaymentOption::AllUpfront => total_cost,
        PaymentOption::PartialUpfront => total_cost * PARTIAL_UPFRONT_SHARE,
        PaymentOption::NoUpfront => 0.0,
    };
    let recurring_monthly_cost = (total_cost - upfront_cost) / months;

    let savings_percent = if quote.on_demand_rate > 0.0 {
        (quote.on_demand_rate - quote.reserved_rate) / quote.on_demand_rate * 100.0
    } else {
        0.0
    };

    let currency = if quote.currency.is_empty() {
        offering.currency.clone()
    } else {
        quote.currency.clone()
    };

    OfferingDetails {
        offering_id: offering.offering_id.clone(),
        resource_type: offering.resource_type.clone(),
        term: rec.term,
        payment_option: rec.payment_option,
        currency,
        upfront_cost,
        recurring_monthly_cost,
        total_cost,
        effective_hourly_rate: quote.reserved_rate,
        on_demand_hourly_rate: quote.on_demand_rate,
        savings_percent,
    }
}

/// Hourly rate implied by an offering's own pricing, amortized over `months`
pub fn offering_hourly_rate(offering: &Offering, months: u32) -> f64 {
    let hours = HOURS_PER_MONTH * f64::from(months);
    let amortized = match offering.fixed_price {
        Some(price) if hours > 0.0 => price / hours,
        _ => 0.0,
    };
    let recurring: f64 = offering
        .recurring_charges
        .iter()
        .filter(|c| c.frequency == ChargeFrequency::Hourly)
        .map(|c| c.amount)
        .sum();

    amortized + recurring + offering.usage_price
}
