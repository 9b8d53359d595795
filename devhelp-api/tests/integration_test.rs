/// HTTP tests for the devHelp API
///
/// These drive the full router (middleware included) over the in-memory
/// database:
/// - Envelopes, status codes and validation field maps
/// - The refresh cookie lifecycle
/// - Bearer authentication and role guards
/// - Rate limits and their headers

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{request, signup_body, TestContext, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["database"], "connected");
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert!(response.headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_unknown_route() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/api/nope", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.code(), "NOT_FOUND");
    assert_eq!(response.message(), "Route not found");
}

#[tokio::test]
async fn test_signup_sets_cookie_and_returns_payload() {
    let ctx = TestContext::new().await;

    let response = ctx.signup("acme").await;

    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["message"], "Company created successfully");

    let data = &response.body["data"];
    assert_eq!(data["user"]["email"], "admin@acme.io");
    assert_eq!(data["user"]["role"], "admin");
    assert_eq!(data["user"]["company"]["name"], "acme Inc");
    assert_eq!(data["user"]["permissions"]["manageUsers"], true);
    assert_eq!(data["redirectTo"], "/admin/dashboard");
    assert!(data["expiresAt"].is_string());

    let cookie = response.set_cookie();
    assert!(cookie.starts_with("refreshToken="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"));

    // The refresh token only ever travels in the cookie
    let refresh = response.refresh_cookie();
    let refresh_value = refresh.trim_start_matches("refreshToken=");
    assert!(!response.body.to_string().contains(refresh_value));
    assert!(data.get("refreshToken").is_none());
}

#[tokio::test]
async fn test_signup_duplicate_company_email() {
    let ctx = TestContext::new().await;
    ctx.signup("acme").await;

    let response = ctx.post("/api/auth/signup", None, signup_body("acme")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "EMAIL_EXISTS");
    assert_eq!(response.message(), "Company email already registered");
}

#[tokio::test]
async fn test_signup_validation_fields() {
    let ctx = TestContext::new().await;

    let mut body = signup_body("acme");
    body["companyEmail"] = json!("not-an-email");
    body["adminFirstName"] = json!("A");
    body["agreeToTerms"] = json!(false);

    let response = ctx.post("/api/auth/signup", None, body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "VALIDATION_ERROR");
    let fields = &response.body["error"]["fields"];
    assert_eq!(fields["companyEmail"], "Invalid company email address");
    assert_eq!(
        fields["adminFirstName"],
        "First Name must be between 2 and 100 characters"
    );
    assert!(fields["agreeToTerms"].is_string());
}

#[tokio::test]
async fn test_signup_missing_field() {
    let ctx = TestContext::new().await;

    let response = ctx
        .post("/api/auth/signup", None, json!({ "companyEmail": "hq@acme.io" }))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "VALIDATION_ERROR");
    assert_eq!(response.body["error"]["fields"]["companyName"], "Required");
}

#[tokio::test]
async fn test_malformed_json_body() {
    let ctx = TestContext::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "VALIDATION_ERROR");
    assert!(response.body["error"]["fields"]["body"].is_string());
}

#[tokio::test]
async fn test_login_and_remember_me() {
    let ctx = TestContext::new().await;
    ctx.signup("acme").await;

    let response = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "  ADMIN@acme.io ", "password": PASSWORD, "rememberMe": true }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Login successful");
    assert!(response.set_cookie().contains("Max-Age=2592000"));
}

#[tokio::test]
async fn test_login_wrong_password_and_unknown_email_look_alike() {
    let ctx = TestContext::new().await;
    ctx.signup("acme").await;

    let wrong = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "admin@acme.io", "password": "Wr0ng!Pass" }),
        )
        .await;
    let unknown = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ghost@acme.io", "password": PASSWORD }),
        )
        .await;

    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.code(), "INVALID_CREDENTIALS");
    assert_eq!(wrong.body, unknown.body);
}

#[tokio::test]
async fn test_refresh_with_cookie() {
    let ctx = TestContext::new().await;
    let signup = ctx.signup("acme").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/refresh")
        .header(header::COOKIE, format!("theme=dark; {}", signup.refresh_cookie()))
        .body(Body::empty())
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["message"], "Token refreshed successfully");
    assert_eq!(response.body["data"]["tokenType"], "Bearer");
    assert_eq!(response.body["data"]["expiresIn"], 900);

    let access = response.body["data"]["accessToken"].as_str().unwrap();
    let users = ctx.get("/api/company/users", Some(access)).await;
    assert_eq!(users.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_cookie() {
    let ctx = TestContext::new().await;

    let response = ctx.post("/api/auth/refresh", None, json!({})).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "NO_REFRESH_TOKEN");
    assert_eq!(response.message(), "Refresh token not found");
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let ctx = TestContext::new().await;
    let access = ctx.signup("acme").await.token();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/refresh")
        .header(header::COOKIE, format!("refreshToken={access}"))
        .body(Body::empty())
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "Invalid refresh token");
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let ctx = TestContext::new().await;

    let response = ctx.post("/api/auth/logout", None, json!({})).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Logged out successfully");
    let cookie = response.set_cookie();
    assert!(cookie.starts_with("refreshToken=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_production_cookies_are_secure() {
    let ctx = TestContext::with_env(&[("APP_ENV", "production")]).await;

    let response = ctx.signup("acme").await;

    assert!(response.set_cookie().ends_with("; Secure"));
    assert!(response.headers.get("strict-transport-security").is_some());
}

#[tokio::test]
async fn test_auth_middleware_messages() {
    let ctx = TestContext::new().await;

    let missing = ctx.get("/api/company/users", None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.code(), "UNAUTHORIZED");
    assert_eq!(missing.message(), "No authorization header");

    let request = Request::builder()
        .uri("/api/company/users")
        .header(header::AUTHORIZATION, "Basic abc")
        .body(Body::empty())
        .unwrap();
    let basic = ctx.send(request).await;
    assert_eq!(basic.message(), "Invalid authorization format");

    let garbage = ctx.get("/api/company/users", Some("not.a.jwt")).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.message(), "Invalid token");
}

#[tokio::test]
async fn test_invite_accept_and_member_guards() {
    let ctx = TestContext::new().await;
    let (admin, member) = ctx.company_with_member("acme").await;

    // Member can list but not manage
    let listed = ctx.get("/api/company/users", Some(&member)).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["data"]["pagination"]["totalItems"], 2);

    let denied = ctx
        .post(
            "/api/admin/members/invite",
            Some(&member),
            json!({ "email": "x@acme.io", "firstName": "Xan", "lastName": "Der" }),
        )
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.code(), "FORBIDDEN");
    assert_eq!(denied.message(), "Access denied. Admin role required.");

    // Admin cannot invite themself
    let this_is_me = ctx
        .post(
            "/api/admin/members/invite",
            Some(&admin),
            json!({ "email": "Admin@Acme.io", "firstName": "Ada", "lastName": "Admin" }),
        )
        .await;
    assert_eq!(this_is_me.code(), "CANNOT_INVITE_SELF");
}

#[tokio::test]
async fn test_send_invite_response_shape() {
    let ctx = TestContext::new().await;
    let admin = ctx.signup("acme").await.token();

    let response = ctx
        .post(
            "/api/admin/members/invite",
            Some(&admin),
            json!({ "email": " NEW@acme.io ", "firstName": "Nia", "lastName": "Newton" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], "Invitation sent successfully");
    let invitation = &response.body["data"]["invitation"];
    assert_eq!(invitation["email"], "new@acme.io");
    assert_eq!(invitation["role"], "member");
    assert_eq!(invitation["status"], "pending");
    assert_eq!(invitation["invitedBy"]["name"], "Ada Admin");

    let again = ctx
        .post(
            "/api/admin/members/invite",
            Some(&admin),
            json!({ "email": "new@acme.io", "firstName": "Nia", "lastName": "Newton" }),
        )
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.code(), "INVITE_ALREADY_SENT");
}

#[tokio::test]
async fn test_validate_invite() {
    let ctx = TestContext::new().await;
    let admin = ctx.signup("acme").await.token();
    ctx.post(
        "/api/admin/members/invite",
        Some(&admin),
        json!({ "email": "new@acme.io", "firstName": "Nia", "lastName": "Newton" }),
    )
    .await;
    let token = ctx.invite_token("new@acme.io");

    let valid = ctx
        .get(&format!("/api/auth/validate-invite?token={token}"), None)
        .await;
    assert_eq!(valid.status, StatusCode::OK);
    assert_eq!(valid.body["data"]["email"], "new@acme.io");
    assert_eq!(valid.body["data"]["company"]["name"], "acme Inc");
    assert!(valid.headers.get("ratelimit-remaining").is_some());

    let missing = ctx.get("/api/auth/validate-invite", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.code(), "INVALID_INVITE_TOKEN");

    let malformed = ctx.get("/api/auth/validate-invite?token=abc", None).await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.code(), "INVALID_TOKEN_FORMAT");
}

#[tokio::test]
async fn test_accept_invitation_twice() {
    let ctx = TestContext::new().await;
    ctx.company_with_member("acme").await;
    let token = ctx.invite_token("member@acme.io");

    let response = ctx
        .post(
            "/api/auth/accept-invitation",
            None,
            json!({
                "token": token,
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
                "agreeToTerms": true
            }),
        )
        .await;

    assert_eq!(response.code(), "INVITATION_ALREADY_ACCEPTED");
}

#[tokio::test]
async fn test_list_users_pagination_and_validation() {
    let ctx = TestContext::new().await;
    let (admin, _) = ctx.company_with_member("acme").await;

    let page = ctx
        .get("/api/company/users?page=1&limit=1&role=member", Some(&admin))
        .await;
    assert_eq!(page.status, StatusCode::OK);
    let pagination = &page.body["data"]["pagination"];
    assert_eq!(pagination["currentPage"], 1);
    assert_eq!(pagination["itemsPerPage"], 1);
    assert_eq!(pagination["totalItems"], 1);
    assert_eq!(page.body["data"]["users"][0]["email"], "member@acme.io");

    let too_many = ctx.get("/api/company/users?limit=500", Some(&admin)).await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);
    assert_eq!(too_many.code(), "VALIDATION_ERROR");
    assert_eq!(
        too_many.body["error"]["fields"]["limit"],
        "Limit must be between 1 and 100"
    );
}

#[tokio::test]
async fn test_update_user_status() {
    let ctx = TestContext::new().await;
    let (admin, member) = ctx.company_with_member("acme").await;

    let listed = ctx.get("/api/company/users?role=member", Some(&admin)).await;
    let member_id = listed.body["data"]["users"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/company/users/{member_id}/status");

    let by_member = ctx.patch(&uri, Some(&member), json!({ "status": "blocked" })).await;
    assert_eq!(by_member.status, StatusCode::FORBIDDEN);

    let blocked = ctx.patch(&uri, Some(&admin), json!({ "status": "blocked" })).await;
    assert_eq!(blocked.status, StatusCode::OK);
    assert_eq!(blocked.body["message"], "User blocked successfully");
    assert_eq!(blocked.body["data"]["status"], "blocked");

    let login = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "member@acme.io", "password": PASSWORD }),
        )
        .await;
    assert_eq!(login.code(), "USER_INACTIVE");

    let bad_id = ctx
        .patch("/api/company/users/not-a-uuid/status", Some(&admin), json!({ "status": "active" }))
        .await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_id.body["error"]["fields"]["id"], "Invalid ID format");
}

#[tokio::test]
async fn test_forgot_and_reset_password() {
    let ctx = TestContext::new().await;
    ctx.signup("acme").await;

    let forgot = ctx
        .post("/api/auth/forgot-password", None, json!({ "email": "admin@acme.io" }))
        .await;
    assert_eq!(forgot.status, StatusCode::OK);
    assert!(forgot.message().starts_with("If an account exists"));

    let unknown = ctx
        .post("/api/auth/forgot-password", None, json!({ "email": "ghost@acme.io" }))
        .await;
    assert_eq!(unknown.body, forgot.body);

    let token = ctx.invite_token("admin@acme.io");
    let new_password = "N3w!Password";
    let reset = ctx
        .post(
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": new_password, "confirmPassword": new_password }),
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK, "{}", reset.body);
    assert_eq!(reset.body["success"], true);
    assert_eq!(reset.body["redirectTo"], "http://app.test/login");

    let reused = ctx
        .post(
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": "An0ther!Pass", "confirmPassword": "An0ther!Pass" }),
        )
        .await;
    assert_eq!(reused.code(), "TOKEN_ALREADY_USED");

    let login = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "admin@acme.io", "password": new_password }),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_reset_password_mismatch() {
    let ctx = TestContext::new().await;

    let response = ctx
        .post(
            "/api/auth/reset-password",
            None,
            json!({
                "token": "6f1c1a3e-3b7a-4c47-9a55-2f1d7e0b8c11",
                "newPassword": PASSWORD,
                "confirmPassword": "Different!1"
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["error"]["fields"]["confirmPassword"],
        "Passwords don't match"
    );
}

#[tokio::test]
async fn test_forgot_password_email_limit() {
    let ctx = TestContext::new().await;

    for i in 0..3 {
        let request = forgot_from(&format!("198.51.100.{i}"), "target@acme.io");
        let response = ctx.send(request).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let response = ctx.send(forgot_from("198.51.100.9", "TARGET@acme.io")).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.code(), "MANY_REQUESTS");
    assert_eq!(
        response.message(),
        "Too many requests. Please try again in 15 minutes."
    );
    assert!(response.headers.get(header::RETRY_AFTER).is_some());
}

fn forgot_from(ip: &str, email: &str) -> Request<Body> {
    let mut request = request(
        Method::POST,
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": email })),
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", ip.parse().unwrap());
    request
}

#[tokio::test]
async fn test_super_admin_login_rate_limit() {
    let ctx = TestContext::new().await;
    let attempt = || {
        let mut request = request(
            Method::POST,
            "/api/super-admin/login",
            None,
            Some(json!({ "email": common::SUPER_ADMIN_EMAIL, "password": "Wr0ng!Pass" })),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.50".parse().unwrap());
        request
    };

    for remaining in (0..5).rev() {
        let response = ctx.send(attempt()).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.code(), "INVALID_SUPER_ADMIN_CREDENTIALS");
        assert_eq!(response.headers["ratelimit-limit"], "5");
        assert_eq!(
            response.headers["ratelimit-remaining"],
            remaining.to_string().as_str()
        );
    }

    let limited = ctx.send(attempt()).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        limited.message(),
        "Too many attempts. Please try again in 15 minutes"
    );
    assert_eq!(limited.headers["ratelimit-remaining"], "0");
    assert!(limited.headers.get(header::RETRY_AFTER).is_some());
}

#[tokio::test]
async fn test_super_admin_flow() {
    let ctx = TestContext::new().await;
    let admin = ctx.signup("acme").await.token();
    let root = ctx.super_admin_token().await;

    let denied = ctx.get("/api/super-admin/companies", Some(&admin)).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.code(), "UNAUTHORIZED_SUPER_ADMIN");
    assert_eq!(denied.message(), "Super admin access required");

    let listed = ctx
        .get("/api/super-admin/companies?sortBy=name&sortOrder=asc", Some(&root))
        .await;
    assert_eq!(listed.status, StatusCode::OK, "{}", listed.body);
    let company = &listed.body["data"]["companies"][0];
    assert_eq!(company["name"], "acme Inc");
    assert_eq!(company["totalUsers"], 1);
    assert_eq!(company["monthlyRevenue"], 0);
    assert_eq!(listed.body["data"]["stats"]["totalCompanies"], 1);
    assert_eq!(listed.body["data"]["pagination"]["itemsPerPage"], 20);

    let id = company["id"].as_str().unwrap().to_string();

    let detail = ctx
        .get(&format!("/api/super-admin/companies/{id}"), Some(&root))
        .await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["data"]["company"]["admin"]["email"], "admin@acme.io");
    assert!(detail.body["data"]["company"]["billing"]["lastPaymentDate"].is_null());

    let bad = ctx
        .get("/api/super-admin/companies/not-a-uuid", Some(&root))
        .await;
    assert_eq!(bad.code(), "INVALID_COMPANY_ID");
    assert_eq!(bad.message(), "Invalid company ID format");

    let suspended = ctx
        .patch(
            &format!("/api/super-admin/companies/{id}/status"),
            Some(&root),
            json!({ "status": "suspended" }),
        )
        .await;
    assert_eq!(suspended.status, StatusCode::OK);
    assert_eq!(suspended.body["message"], "Company status updated to suspended");

    let login = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "admin@acme.io", "password": PASSWORD }),
        )
        .await;
    assert_eq!(login.status, StatusCode::FORBIDDEN);
    assert_eq!(login.code(), "COMPANY_SUSPENDED");
}

#[tokio::test]
async fn test_super_admin_login_payload() {
    let ctx = TestContext::new().await;

    let response = ctx
        .post(
            "/api/super-admin/login",
            None,
            json!({ "email": common::SUPER_ADMIN_EMAIL, "password": common::SUPER_ADMIN_PASSWORD }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Login successful");
    let data = &response.body["data"];
    assert_eq!(data["user"]["role"], "super_admin");
    assert_eq!(data["user"]["permissions"]["managePlatform"], true);
    assert_eq!(data["redirectTo"], "/super-admin/dashboard");
    assert!(response.set_cookie().starts_with("refreshToken="));

    // Super admins have no company to list users from
    let users = ctx.get("/api/company/users", Some(&response.token())).await;
    assert_eq!(users.status, StatusCode::UNAUTHORIZED);
    assert_eq!(users.message(), "User is not associated with a company");
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let ctx = TestContext::new().await;
    let signup = ctx.signup("acme").await;
    let cookie = signup.refresh_cookie();
    let refresh = cookie.trim_start_matches("refreshToken=");

    let response = ctx.get("/api/company/users", Some(refresh)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "Invalid token");
}
