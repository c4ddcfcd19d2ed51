//! Network, device, identity, payment, behavioral and velocity signals.
//! Each rule adds fixed points (capped for the per-unit rules) and names itself in `factors`.

use crate::transaction::Transaction;

const TOR: f64 = 45.0;
const VPN: f64 = 40.0;
const PROXY: f64 = 35.0;
const EMULATOR: f64 = 35.0;
const ADDRESS_MISMATCH: f64 = 20.0;
const THREE_DS_FAILED: f64 = 25.0;
const COUNTRY_MISMATCH: f64 = 15.0;
const HIGH_RISK_CATEGORY: f64 = 15.0;
const NEW_CUSTOMER: f64 = 10.0;
const PHONE_UNVERIFIED: f64 = 8.0;
const ADDRESS_UNVERIFIED: f64 = 8.0;
const CART_ABANDON_RATE: f64 = 0.3;
const CART_ABANDON: f64 = 15.0;

/// (points per unit, cap)
const CHARGEBACKS: (f64, f64) = (25.0, 50.0);
const PAYMENT_ATTEMPTS: (f64, f64) = (10.0, 30.0);
const CARD_VELOCITY: (f64, f64) = (8.0, 25.0);
const IP_VELOCITY: (f64, f64) = (3.0, 20.0);

/// Free allowance before velocity counts
const CARD_TXN_PER_HOUR_ALLOWED: u32 = 2;
const IP_TXN_PER_DAY_ALLOWED: u32 = 5;

fn per_unit(units: u32, (points, cap): (f64, f64)) -> f64 {
    (units as f64 * points).min(cap)
}

fn same_country(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub(crate) fn context_signals(tx: &Transaction, high_risk_categories: &[String], factors: &mut Vec<String>) -> f64 {
    let mut risk = 0.0;
    let mut hit = |points: f64, factor: String| {
        risk += points;
        factors.push(factor);
    };

    let net = &tx.network;
    if net.uses_tor {
        hit(TOR, "Connection through the Tor network".into());
    }
    if net.uses_vpn {
        hit(VPN, "Connection through a VPN".into());
    }
    if net.uses_proxy {
        hit(PROXY, "Connection through a proxy".into());
    }
    if tx.device.is_emulator {
        hit(EMULATOR, "Device is an emulator".into());
    }

    let id = &tx.identity;
    let pay = &tx.payment;
    if id.address_mismatch {
        hit(ADDRESS_MISMATCH, "Billing and shipping addresses differ".into());
    }
    if pay.three_ds_passed == Some(false) {
        hit(THREE_DS_FAILED, "3-D Secure authentication not passed".into());
    }
    if let (Some(issuer), Some(ip)) = (pay.card_issuer_country.as_deref(), net.ip_country.as_deref()) {
        if !same_country(issuer, ip) {
            hit(COUNTRY_MISMATCH, format!("Card issued in {issuer} but IP located in {ip}"));
        }
    }
    if let Some(category) = pay.item_category.as_deref() {
        if high_risk_categories.iter().any(|c| c.eq_ignore_ascii_case(category.trim())) {
            hit(HIGH_RISK_CATEGORY, format!("High-risk item category: {category}"));
        }
    }
    if id.previous_orders == Some(0) {
        hit(NEW_CUSTOMER, "New customer with no previous orders".into());
    }
    if id.phone_verified == Some(false) {
        hit(PHONE_UNVERIFIED, "Phone number not verified".into());
    }
    if id.address_verified == Some(false) {
        hit(ADDRESS_UNVERIFIED, "Address not verified".into());
    }
    if tx.behavior.cart_abandon_rate > CART_ABANDON_RATE {
        hit(
            CART_ABANDON,
            format!("High cart abandonment rate: {:.0}%", tx.behavior.cart_abandon_rate * 100.0),
        );
    }

    if id.previous_chargebacks > 0 {
        let n = id.previous_chargebacks;
        hit(per_unit(n, CHARGEBACKS), format!("{n} previous chargeback(s)"));
    }
    if pay.payment_attempts > 1 {
        let n = pay.payment_attempts;
        hit(per_unit(n - 1, PAYMENT_ATTEMPTS), format!("{n} payment attempts"));
    }
    let card = tx.velocity.card_txn_last_hour;
    if card > CARD_TXN_PER_HOUR_ALLOWED {
        hit(
            per_unit(card - CARD_TXN_PER_HOUR_ALLOWED, CARD_VELOCITY),
            format!("{card} transactions from the same card in the last hour"),
        );
    }
    let ip = tx.velocity.ip_txn_last_24h;
    if ip > IP_TXN_PER_DAY_ALLOWED {
        hit(
            per_unit(ip - IP_TXN_PER_DAY_ALLOWED, IP_VELOCITY),
            format!("{ip} transactions from the same IP in the last 24 hours"),
        );
    }

    risk
}
