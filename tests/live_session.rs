//! Session tests against a live PAS instance. They are skipped unless
//! `PAS_USERNAME` and `PAS_PASSWORD` are present, either in the
//! environment or in a local `.env` file.

use serial_test::serial;

use seer_pas_sdk::SeerClient;

fn credentials_present() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("PAS_USERNAME").is_ok() && std::env::var("PAS_PASSWORD").is_ok()
}

#[tokio::test]
#[serial]
async fn login_and_list_tenants() {
    if !credentials_present() {
        return;
    }

    let client = SeerClient::from_env().await.expect("login failed");
    let tenants = client.user_tenants().await.expect("usertenants failed");
    assert!(!tenants.is_empty(), "account belongs to no tenant");
    assert!(client.active_tenant_id().await.is_some());
}

#[tokio::test]
#[serial]
async fn logout_invalidates_the_session() {
    if !credentials_present() {
        return;
    }

    let client = SeerClient::from_env().await.expect("login failed");
    client.logout().await.expect("logout failed");
}
