use tracing::debug;

use crate::models::{
    AppointmentError, PaymentStatus, PricingSnapshot, RejectionReason, ServiceRecord,
};

pub struct PricingService {
    default_currency: String,
}

impl PricingService {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    /// Price snapshot taken once at booking: `base - discount + copay`.
    pub fn snapshot(
        &self,
        service: &ServiceRecord,
        discount_amount: Option<f64>,
        copay_amount: Option<f64>,
    ) -> Result<PricingSnapshot, AppointmentError> {
        let base_price = validate_amount("base_price", service.base_price)?;
        let discount = validate_amount("discount_amount", discount_amount.unwrap_or(0.0))?;
        let copay = validate_amount("copay_amount", copay_amount.unwrap_or(0.0))?;

        if discount > base_price {
            return Err(AppointmentError::ValidationError(format!(
                "discount {:.2} exceeds base price {:.2}",
                discount, base_price
            )));
        }

        let currency = service
            .currency
            .clone()
            .unwrap_or_else(|| self.default_currency.clone());

        let snapshot = PricingSnapshot::compute(base_price, discount, copay, currency);
        debug!(
            "Priced service {} at {:.2} {} (base {:.2}, discount {:.2}, copay {:.2})",
            service.id, snapshot.total_amount, snapshot.currency, base_price, discount, copay
        );

        Ok(snapshot)
    }

    /// Apply discount/copay patches to an existing snapshot. Invoiced
    /// snapshots are frozen.
    pub fn reprice(
        &self,
        current: &PricingSnapshot,
        discount_amount: Option<f64>,
        copay_amount: Option<f64>,
    ) -> Result<PricingSnapshot, AppointmentError> {
        if current.is_invoiced() {
            return Err(AppointmentError::PolicyViolation(RejectionReason::PricingLocked));
        }

        let discount = validate_amount("discount_amount", discount_amount.unwrap_or(current.discount_amount))?;
        let copay = validate_amount("copay_amount", copay_amount.unwrap_or(current.copay_amount))?;

        if discount > current.base_price {
            return Err(AppointmentError::ValidationError(format!(
                "discount {:.2} exceeds base price {:.2}",
                discount, current.base_price
            )));
        }

        Ok(PricingSnapshot::compute(
            current.base_price,
            discount,
            copay,
            current.currency.clone(),
        ))
    }

    pub fn validate_refund(
        &self,
        pricing: &PricingSnapshot,
        refund_amount: f64,
    ) -> Result<f64, AppointmentError> {
        let refund = validate_amount("refund_amount", refund_amount)?;
        if refund > pricing.total_amount {
            return Err(AppointmentError::ValidationError(format!(
                "refund {:.2} exceeds total amount {:.2}",
                refund, pricing.total_amount
            )));
        }
        Ok(refund)
    }

    /// Payment status after a cancellation: any refund marks it refunded,
    /// otherwise it is left as it was.
    pub fn reconcile_after_cancellation(&self, current: PaymentStatus, refund_amount: f64) -> PaymentStatus {
        if refund_amount > 0.0 {
            PaymentStatus::Refunded
        } else {
            current
        }
    }
}

fn validate_amount(field: &str, amount: f64) -> Result<f64, AppointmentError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppointmentError::ValidationError(format!(
            "{} must be a non-negative amount, got {}",
            field, amount
        )));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use uuid::Uuid;

    fn therapy_service(base_price: f64) -> ServiceRecord {
        ServiceRecord {
            id: Uuid::new_v4(),
            name: "Individual therapy".to_string(),
            default_duration_minutes: Some(50),
            base_price,
            currency: None,
        }
    }

    #[test]
    fn total_is_base_minus_discount_plus_copay() {
        let service = PricingService::new("EUR");
        let snapshot = service.snapshot(&therapy_service(60.0), Some(10.0), Some(5.0)).unwrap();

        assert_eq!(snapshot.total_amount, 55.0);
        assert_eq!(snapshot.currency, "EUR");
        assert!(!snapshot.is_invoiced());
    }

    #[test]
    fn rejects_negative_and_oversized_discounts() {
        let service = PricingService::new("EUR");
        assert_matches!(
            service.snapshot(&therapy_service(60.0), Some(-1.0), None),
            Err(AppointmentError::ValidationError(_))
        );
        assert_matches!(
            service.snapshot(&therapy_service(60.0), Some(61.0), None),
            Err(AppointmentError::ValidationError(_))
        );
    }

    #[test]
    fn invoiced_pricing_is_frozen() {
        let service = PricingService::new("EUR");
        let mut snapshot = service.snapshot(&therapy_service(60.0), None, None).unwrap();
        snapshot.invoiced_at = Some(Utc::now());

        assert_matches!(
            service.reprice(&snapshot, Some(5.0), None),
            Err(AppointmentError::PolicyViolation(RejectionReason::PricingLocked))
        );
    }

    #[test]
    fn reprice_keeps_untouched_components() {
        let service = PricingService::new("EUR");
        let snapshot = service.snapshot(&therapy_service(60.0), Some(10.0), Some(5.0)).unwrap();
        let repriced = service.reprice(&snapshot, None, Some(0.0)).unwrap();

        assert_eq!(repriced.discount_amount, 10.0);
        assert_eq!(repriced.total_amount, 50.0);
    }

    #[test]
    fn refund_reconciliation() {
        let service = PricingService::new("EUR");
        assert_eq!(service.reconcile_after_cancellation(PaymentStatus::Paid, 45.0), PaymentStatus::Refunded);
        assert_eq!(service.reconcile_after_cancellation(PaymentStatus::Pending, 0.0), PaymentStatus::Pending);
    }
}
