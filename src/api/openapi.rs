use super::handlers::{email_change, health, passkeys, sudo};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Full OpenAPI document covering all route groups.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, mut api) = public_router().split_for_parts();
    let (_router, session_api) = session_router().split_for_parts();
    let (_router, sudo_api) = sudo_router().split_for_parts();
    api.merge(session_api);
    api.merge(sudo_api);

    let mut custodia_tag = Tag::new("custodia");
    custodia_tag.description = Some("Account security self-service API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Session elevation (sudo mode)".to_string());

    let mut me_tag = Tag::new("me");
    me_tag.description = Some("Email changes and passkeys".to_string());

    api.tags = Some(vec![custodia_tag, auth_tag, me_tag]);

    api
}

/// Routes reachable without a session: health and the emailed
/// verification link.
///
/// Add new endpoints to one of these routers via `.routes(routes!(...))` so
/// they are both served and included in the generated `OpenAPI` spec; the
/// group decides which guards wrap them in `api::new`.
pub(crate) fn public_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(email_change::verify_email_change_route))
}

/// Routes requiring a valid session.
pub(crate) fn session_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(sudo::sudo_status))
        .routes(routes!(sudo::sudo_challenge))
        .routes(routes!(email_change::list_pending_changes))
        .routes(routes!(passkeys::list_passkeys))
}

/// Routes requiring a session plus an active sudo elevation.
pub(crate) fn sudo_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(email_change::request_email_change))
        .routes(routes!(passkeys::register_options))
        .routes(routes!(passkeys::register_finish))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}
