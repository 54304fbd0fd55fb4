use crate::error::{IntoLizError, LizError};
use keyring::Entry;

/// Service name for keyring storage
const SERVICE_NAME: &str = "liz-assistant";

/// Key name for the upstream provider API key
const PROVIDER_KEY_NAME: &str = "google_ai_key";

fn provider_entry() -> Result<Entry, LizError> {
    Entry::new(SERVICE_NAME, PROVIDER_KEY_NAME)
        .map_liz_err(|e| LizError::Secrets(format!("Failed to create keyring entry: {}", e)))
}

/// Save the provider API key to the OS keyring
///
/// Uses the native credential storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
pub fn save_api_key(api_key: &str) -> Result<(), LizError> {
    log::info!("Saving provider API key to OS keyring");

    provider_entry()?
        .set_password(api_key)
        .map_liz_err(|e| LizError::Secrets(format!("Failed to save API key to keyring: {}", e)))?;

    log::info!("API key saved successfully");
    Ok(())
}

/// Load the provider API key from the OS keyring
///
/// Returns `None` if no key is stored or the keyring is unavailable.
pub fn load_api_key() -> Result<Option<String>, LizError> {
    match provider_entry()?.get_password() {
        Ok(password) => {
            log::info!("API key loaded from keyring");
            Ok(Some(password))
        }
        Err(keyring::Error::NoEntry) => {
            log::info!("No API key found in keyring");
            Ok(None)
        }
        Err(e) => {
            // Headless hosts often have no secret service; treat as absent
            log::warn!("Failed to load API key from keyring: {}", e);
            Ok(None)
        }
    }
}

pub fn delete_api_key() -> Result<(), LizError> {
    log::info!("Deleting provider API key from OS keyring");

    match provider_entry()?.delete_credential() {
        Ok(_) => {
            log::info!("API key deleted successfully");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            log::info!("No API key to delete");
            Ok(())
        }
        Err(e) => Err(LizError::Secrets(format!("Failed to delete API key: {}", e))),
    }
}

/// Pick the provider key: environment first, then the keyring
///
/// A missing key is fatal for the proxy.
pub fn resolve_provider_key(from_env: Option<String>) -> Result<String, LizError> {
    if let Some(key) = from_env.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        log::info!("Using provider API key from environment");
        return Ok(key);
    }

    load_api_key()?
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            LizError::Secrets(
                "No provider API key: set GOOGLE_AI_KEY or run `liz key set`".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_key_wins() {
        let key = resolve_provider_key(Some("  env-key-123 ".to_string())).unwrap();
        assert_eq!(key, "env-key-123");
    }

    #[test]
    #[ignore = "requires an OS keyring"]
    fn test_save_and_load_api_key() {
        save_api_key("test-api-key-12345").unwrap();
        assert_eq!(load_api_key().unwrap().as_deref(), Some("test-api-key-12345"));

        delete_api_key().unwrap();
        assert_eq!(load_api_key().unwrap(), None);
    }
}
