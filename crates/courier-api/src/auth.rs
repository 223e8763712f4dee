use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{ConnectInfo, State},
    response::IntoResponse,
};
use ipnet::IpNet;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};

use courier_db::Database;
use courier_gateway::dispatcher::Dispatcher;
use courier_types::api::{Claims, IntranetCheckResponse, LoginRequest, LoginResponse, UserResponse};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub intranet_ranges: Vec<IpNet>,
    pub upload_dir: PathBuf,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    /// The intranet gate: true if the peer address falls inside one of the
    /// configured network ranges. IPv4-mapped IPv6 peers (common when the
    /// listener binds a dual-stack socket) are checked as their IPv4 form.
    pub fn is_intranet(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(IpAddr::V4)
                .unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        self.intranet_ranges.iter().any(|net| net.contains(&ip))
    }
}

/// Company network prefixes admitted at login when none are configured.
pub fn default_intranet_ranges() -> Vec<IpNet> {
    parse_intranet_ranges("192.168.0.0/16,10.0.0.0/8,172.16.0.0/12")
        .expect("default ranges are valid")
}

/// Parse a comma-separated CIDR list, e.g. "192.168.0.0/16,10.0.0.0/8".
pub fn parse_intranet_ranges(spec: &str) -> anyhow::Result<Vec<IpNet>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .map_err(|e| anyhow::anyhow!("bad network range '{}': {}", s, e))
        })
        .collect()
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.is_intranet(addr.ip()) {
        warn!("login denied for {} from {}", req.phone, addr.ip());
        return Err(ApiError::NetworkDenied);
    }

    let user = state
        .db
        .get_user_by_phone(&req.phone)?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&user.password, &req.password) {
        return Err(ApiError::InvalidCredentials);
    }

    let token = create_token(&state.jwt_secret, user.id, &user.phone, user.is_admin)?;
    info!("{} ({}) logged in from {}", user.name, user.id, addr.ip());

    Ok(Json(LoginResponse {
        success: true,
        token,
        user: UserResponse {
            id: user.id,
            phone: user.phone,
            name: user.name,
            is_admin: user.is_admin,
        },
    }))
}

pub async fn check_intranet(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Json<IntranetCheckResponse> {
    Json(IntranetCheckResponse {
        is_intranet: state.is_intranet(addr.ip()),
    })
}

// -- Password hashing (Argon2id, PHC string format) --

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// -- Tokens --

/// Token lifetime is fixed at 24 hours.
pub fn create_token(
    secret: &str,
    user_id: i64,
    phone: &str,
    is_admin: bool,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        phone: phone.to_string(),
        is_admin,
        exp: (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_default_ranges() -> AppStateInner {
        AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            jwt_secret: "test-secret".into(),
            intranet_ranges: default_intranet_ranges(),
            upload_dir: PathBuf::from("/tmp"),
            dispatcher: Dispatcher::new(),
        }
    }

    #[test]
    fn test_intranet_gate_default_ranges() {
        let state = state_with_default_ranges();

        assert!(state.is_intranet("192.168.1.5".parse().unwrap()));
        assert!(state.is_intranet("10.1.2.3".parse().unwrap()));
        assert!(state.is_intranet("172.16.0.9".parse().unwrap()));

        assert!(!state.is_intranet("8.8.8.8".parse().unwrap()));
        assert!(!state.is_intranet("172.32.0.1".parse().unwrap()));
        assert!(!state.is_intranet("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_intranet_gate_unwraps_mapped_ipv6() {
        let state = state_with_default_ranges();
        assert!(state.is_intranet("::ffff:192.168.1.5".parse().unwrap()));
        assert!(!state.is_intranet("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_intranet_ranges() {
        let ranges = parse_intranet_ranges("192.168.0.0/16, 10.0.0.0/8").unwrap();
        assert_eq!(ranges.len(), 2);

        assert!(parse_intranet_ranges("not-a-cidr").is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let token = create_token("secret", 42, "admin", true).unwrap();
        let claims = decode_token("secret", &token).unwrap();

        assert_eq!(claims.sub, 42);
        assert_eq!(claims.phone, "admin");
        assert!(claims.is_admin);
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let token = create_token("secret", 42, "admin", false).unwrap();
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("admin123").unwrap();
        assert!(verify_password(&hash, "admin123"));
        assert!(!verify_password(&hash, "admin124"));
        assert!(!verify_password("not-a-phc-string", "admin123"));
    }
}
