//! Typed exchange errors and the classifications the order flow relies on.

use thiserror::Error;

/// Binance rejects with these when the order is too small or badly rounded.
/// Quantity-range codes (-4003, -4005) only count when the message names a
/// minimum.
const NOTIONAL_REJECTION_CODES: [i64; 2] = [
    -4164, // Order's notional must be no smaller than ...
    -1111, // Precision is over the maximum defined for this asset
];

const INVALID_API_KEY: i64 = -2008;
const INVALID_KEY_PERMISSIONS: i64 = -2015;

/// Errors reported by the exchange itself (as opposed to transport errors).
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The exchange answered with an error payload.
    #[error("binance error {code}: {msg}")]
    Api { status: u16, code: i64, msg: String },

    /// The exchange answered with a non-success status and no error payload.
    #[error("binance http {status}: {body}")]
    Http { status: u16, body: String },

    /// A signed endpoint was called without credentials.
    #[error("Authentication required: API Key and Secret must be provided")]
    MissingCredentials,
}

impl ExchangeError {
    /// Binance error code, if the exchange sent one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ExchangeError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// User-facing message for a failed credential check.
    pub fn credential_message(&self) -> String {
        match self {
            ExchangeError::Api { code, .. } if *code == INVALID_API_KEY => {
                "API Key 无效，请检查您的 API 密钥配置".to_string()
            }
            ExchangeError::Api { code, .. } if *code == INVALID_KEY_PERMISSIONS => {
                "API Secret 无效，请检查您的 API 密钥配置".to_string()
            }
            ExchangeError::Api { msg, .. } if !msg.is_empty() => {
                format!("Binance API 错误: {}", msg)
            }
            _ => "API Key 验证失败".to_string(),
        }
    }
}

/// Whether an order failure looks like a minimum-notional/precision rejection,
/// the only failure that earns a retry with a larger notional.
pub fn is_notional_rejection(error: &anyhow::Error) -> bool {
    if let Some(code) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ExchangeError>())
        .and_then(ExchangeError::code)
    {
        if NOTIONAL_REJECTION_CODES.contains(&code) {
            return true;
        }
    }

    let message = format!("{:#}", error).to_lowercase();
    ["notional", "minimum", "precision"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Map any error from a credential check to a user-facing message and code.
pub fn credential_failure(error: &anyhow::Error) -> (String, Option<i64>) {
    match error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ExchangeError>())
    {
        Some(exchange_error) => (exchange_error.credential_message(), exchange_error.code()),
        None => ("API Key 验证失败".to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn api_error(code: i64, msg: &str) -> anyhow::Error {
        anyhow::Error::new(ExchangeError::Api {
            status: 400,
            code,
            msg: msg.to_string(),
        })
    }

    #[test]
    fn test_notional_rejection_by_code() {
        let err = api_error(-4164, "Order's notional must be no smaller than 5");
        assert!(is_notional_rejection(&err));

        let err = api_error(-1111, "Precision is over the maximum defined for this asset.");
        assert!(is_notional_rejection(&err));
    }

    #[test]
    fn test_notional_rejection_through_context() {
        let err: anyhow::Result<()> = Err(api_error(-4164, "too small"));
        let err = err.context("Failed to place order").unwrap_err();
        assert!(is_notional_rejection(&err));
    }

    #[test]
    fn test_notional_rejection_by_message() {
        let err = anyhow::anyhow!("Minimum order size not met");
        assert!(is_notional_rejection(&err));
    }

    #[test]
    fn test_quantity_range_errors_not_retried() {
        let err = api_error(-4005, "Quantity greater than max quantity.");
        assert!(!is_notional_rejection(&err));

        let err = api_error(-4003, "Quantity less than or equal to zero.");
        assert!(!is_notional_rejection(&err));

        let err = api_error(-4003, "Quantity less than minimum 1");
        assert!(is_notional_rejection(&err));
    }

    #[test]
    fn test_other_errors_not_retried() {
        let err = api_error(-2019, "Margin is insufficient.");
        assert!(!is_notional_rejection(&err));
    }

    #[test]
    fn test_credential_messages() {
        let (msg, code) = credential_failure(&api_error(-2008, "Invalid Api-Key ID."));
        assert_eq!(msg, "API Key 无效，请检查您的 API 密钥配置");
        assert_eq!(code, Some(-2008));

        let (msg, _) = credential_failure(&api_error(-2015, "Invalid API-key, IP, or permissions for action."));
        assert_eq!(msg, "API Secret 无效，请检查您的 API 密钥配置");

        let (msg, _) = credential_failure(&api_error(-1022, "Signature for this request is not valid."));
        assert_eq!(msg, "Binance API 错误: Signature for this request is not valid.");

        let (msg, code) = credential_failure(&anyhow::anyhow!("connection reset"));
        assert_eq!(msg, "API Key 验证失败");
        assert_eq!(code, None);
    }
}
