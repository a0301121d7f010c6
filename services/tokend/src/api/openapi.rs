//! OpenAPI schema aggregation for the tokend API.
use crate::api::{
    admin, session, system, tokens,
    types::{
        ClientCreateRequest, ClientResponse, ClientRevocationRequest, ErrorResponse, HealthStatus,
        RefreshRequest, RefreshResponse, RefreshTokenRevocationRequest, SessionInfo, TokenRequest,
        TokenResponse,
    },
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tokend",
        version = "v1",
        description = "Client credential issuance, rotation, and revocation"
    ),
    paths(
        system::system_health,
        tokens::issue_token,
        tokens::refresh_token,
        session::current_session,
        admin::create_client,
        admin::revoke_client,
        admin::revoke_refresh_token
    ),
    components(schemas(
        HealthStatus,
        ErrorResponse,
        TokenRequest,
        TokenResponse,
        RefreshRequest,
        RefreshResponse,
        SessionInfo,
        ClientCreateRequest,
        ClientResponse,
        ClientRevocationRequest,
        RefreshTokenRevocationRequest
    )),
    modifiers(&SecuritySchemes),
    tags(
        (name = "system", description = "Health and discovery"),
        (name = "tokens", description = "Session and refresh credentials"),
        (name = "admin", description = "Operator actions")
    )
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "operator",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            );
        }
    }
}
