use crate::auth::AccessToken;
use http_client::Request;

const USER_AGENT: &str = concat!("spotify-history/", env!("CARGO_PKG_VERSION"));

/// Add headers shared by every request
pub fn add_common_headers(request: &mut Request) {
    let _ = request.insert_header("User-Agent", USER_AGENT);
    let _ = request.insert_header("Accept", "application/json");
}

/// Add headers for authenticated Web API GET requests
pub fn add_api_headers(request: &mut Request, token: &AccessToken) {
    add_common_headers(request);
    let _ = request.insert_header("Authorization", token.bearer());
}

/// Add headers for form-encoded POSTs to the accounts service
pub fn add_form_headers(request: &mut Request) {
    add_common_headers(request);
    let _ = request.insert_header(
        "Content-Type",
        "application/x-www-form-urlencoded;charset=UTF-8",
    );
}
