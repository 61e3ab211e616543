//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document for the Smriti API.

use utoipa::OpenApi;

use crate::handlers::{
    HealthResponse, PhotoLink, ReadyResponse, SearchResponse, SkippedPhoto, StepResponse,
    UploadResponse, UploadedFile,
};

/// Smriti API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Smriti API",
        version = "0.1.0",
        description = r#"
## Find yourself in an event's photos

Guests upload a selfie with the event passkey; Smriti searches the event's
photo collection with a face recognition service and returns every photo the
guest appears in.

### How It Works

1. **Start** a search via `POST /searches` (passkey + selfie)
2. **Step** through the photos one batch at a time via `POST /searches/{search_id}/step`
3. **Watch** progress and view matches via `GET /searches/{search_id}`
4. **Download** the matches as a zip via `GET /searches/{search_id}/archive`

Event owners add photos via `POST /photos` with the client passkey.
"#,
        license(
            name = "MIT OR Apache-2.0",
            url = "https://github.com/smriti-photos/smriti/blob/main/LICENSE"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Search", description = "Selfie search over an event's photos"),
        (name = "Photos", description = "Photo uploads by the event owner"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::search::start_search_handler,
        crate::handlers::search::step_search_handler,
        crate::handlers::search::get_search_handler,
        crate::handlers::search::archive_search_handler,
        crate::handlers::search::delete_search_handler,
        crate::handlers::photos::upload_photos_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            SearchResponse,
            StepResponse,
            SkippedPhoto,
            PhotoLink,
            UploadResponse,
            UploadedFile,
        )
    )
)]
pub struct ApiDoc;
