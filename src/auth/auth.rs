use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::{Principal, Role};
use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    pub principal: Principal,
}

impl AuthUser {
    /// Validates decoded claims into the closed principal shape the engine accepts.
    pub fn from_claims(claims: crate::models::Claims) -> Result<Self, String> {
        let principal =
            Principal::from_labels(claims.user_id, &claims.roles).map_err(|e| e.to_string())?;
        Ok(Self {
            username: claims.sub,
            principal,
        })
    }

    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.principal.has_role(Role::Admin) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Admin only"))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Already resolved by the auth middleware on protected scopes.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(actix_web::error::ErrorInternalServerError(
                    "Config missing",
                )));
            }
        };

        let claims = match verify_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        ready(AuthUser::from_claims(claims).map_err(ErrorUnauthorized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Claims;

    #[test]
    fn unknown_role_label_is_refused_at_the_boundary() {
        let claims = Claims {
            user_id: 9,
            sub: "budi".into(),
            roles: vec!["Student".into(), "Superuser".into()],
            exp: 0,
        };
        assert!(AuthUser::from_claims(claims).is_err());
    }

    #[test]
    fn admin_gate() {
        let claims = Claims {
            user_id: 1,
            sub: "admin".into(),
            roles: vec!["Admin".into()],
            exp: 0,
        };
        let user = AuthUser::from_claims(claims).unwrap();
        assert!(user.require_admin().is_ok());
    }
}
