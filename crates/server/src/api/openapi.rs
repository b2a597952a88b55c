//! OpenAPI/Utoipa configuration.

use crate::api::{admin::ADMIN_TAG, health::MISC_TAG, players::PLAYERS_TAG};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "The `admin_token` from the server configuration. Not required when unset.",
                ))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Tiki Taka API",
        version = "1.0.0",
        description = "Weekly attendance for Tiki Taka: player registration, response links and the admin email dispatch."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = PLAYERS_TAG, description = "Registration, responses and roster"),
        (name = ADMIN_TAG, description = "Email dispatch and rate limit controls")
    )
)]
pub struct ApiDoc;
