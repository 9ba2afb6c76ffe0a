//! HMAC-SHA256 signatures for payment callbacks and gateway webhooks.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Failed,
}

impl Verification {
    pub fn is_verified(self) -> bool {
        self == Verification::Verified
    }
}

/// Checks signatures produced by the payment gateway.
///
/// Payment callbacks are signed over `"{gateway_order_id}|{gateway_payment_id}"`
/// with the API key secret; webhooks are signed over the raw body with a
/// separate webhook secret. Signatures are lowercase hex and compared in
/// constant time.
#[derive(Clone)]
pub struct SignatureVerifier {
    payment_mac: HmacSha256,
    webhook_mac: HmacSha256,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(payment_secret: &[u8], webhook_secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            payment_mac: HmacSha256::new_from_slice(payment_secret)?,
            webhook_mac: HmacSha256::new_from_slice(webhook_secret)?,
        })
    }

    /// Verifies the signature returned to the shopper's browser after checkout.
    pub fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Verification {
        let message = payment_message(gateway_order_id, gateway_payment_id);
        verify(&self.payment_mac, message.as_bytes(), signature)
    }

    /// Verifies a webhook body against its signature header.
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> Verification {
        verify(&self.webhook_mac, body, signature)
    }

    /// Signs a payment callback the way the gateway does.
    pub fn sign_payment(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        let message = payment_message(gateway_order_id, gateway_payment_id);
        sign(&self.payment_mac, message.as_bytes())
    }

    /// Signs a webhook body the way the gateway does.
    pub fn sign_webhook(&self, body: &[u8]) -> String {
        sign(&self.webhook_mac, body)
    }
}

fn payment_message(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    format!("{gateway_order_id}|{gateway_payment_id}")
}

fn sign(keyed: &HmacSha256, message: &[u8]) -> String {
    let mut mac = keyed.clone();
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

fn verify(keyed: &HmacSha256, message: &[u8], signature: &str) -> Verification {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return Verification::Failed;
    };
    let mut mac = keyed.clone();
    mac.update(message);
    match mac.verify_slice(&expected) {
        Ok(()) => Verification::Verified,
        Err(_) => Verification::Failed,
    }
}
