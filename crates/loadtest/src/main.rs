use goose::prelude::*;
use serde_json::json;
use std::env;

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/healthz").await?;
    Ok(())
}

async fn get_roster(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/api/roster").await?;
    Ok(())
}

async fn get_rate_limit(user: &mut GooseUser) -> TransactionResult {
    let mut request_builder =
        user.get_request_builder(&GooseMethod::Get, "/api/admin/rate-limit")?;
    if let Ok(token) = env::var("ADMIN_TOKEN") {
        request_builder = request_builder.bearer_auth(token);
    }
    let goose_request = GooseRequest::builder()
        .set_request_builder(request_builder)
        .build();
    let _goose_metrics = user.request(goose_request).await?;
    Ok(())
}

/// Exercises the single-flight queue; expect a mix of 200 and 202.
async fn send_test_email(user: &mut GooseUser) -> TransactionResult {
    let to = env::var("TEST_RECIPIENT").unwrap_or_else(|_| "delivered@resend.dev".to_string());
    let mut request_builder = user
        .get_request_builder(&GooseMethod::Post, "/api/admin/test-email")?
        .json(&json!({ "email": to }));
    if let Ok(token) = env::var("ADMIN_TOKEN") {
        request_builder = request_builder.bearer_auth(token);
    }
    let goose_request = GooseRequest::builder()
        .set_request_builder(request_builder)
        .build();
    let _goose_metrics = user.request(goose_request).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    if env::var("ADMIN_TOKEN").is_err() {
        println!("No ADMIN_TOKEN environment variable set, admin requests are sent without one");
    }

    let mut attack = GooseAttack::initialize()?
        .register_scenario(
            scenario!("HealthCheck").register_transaction(transaction!(health_check)),
        )
        .register_scenario(
            scenario!("Roster")
                .register_transaction(transaction!(get_roster))
                .register_transaction(transaction!(get_rate_limit)),
        );

    // Real sends cost provider quota, so they are opt-in.
    if env::var("LOADTEST_SEND_EMAIL").is_ok() {
        attack = attack.register_scenario(
            scenario!("TestEmail")
                .set_weight(1)?
                .register_transaction(transaction!(send_test_email)),
        );
    }

    attack.execute().await?;

    Ok(())
}
