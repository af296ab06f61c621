use crate::{
    api::{attendance, leave_permit, manual_correction, reconciliation},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

fn build_limiter(requests_per_min: u32) -> Option<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()?;
    Some(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let protected_limiter = match build_limiter(config.rate_protected_per_min) {
        Some(limiter) => Arc::new(limiter),
        None => {
            tracing::error!(
                rate = config.rate_protected_per_min,
                "Invalid rate limit, protected routes not mounted"
            );
            return;
        }
    };

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/attendance")
                    // /attendance/{assignment_id}/tap-in
                    .service(
                        web::resource("/{assignment_id}/tap-in")
                            .route(web::post().to(attendance::tap_in)),
                    )
                    // /attendance/{assignment_id}/tap-out
                    .service(
                        web::resource("/{assignment_id}/tap-out")
                            .route(web::post().to(attendance::tap_out)),
                    )
                    // /attendance/{assignment_id}/{date}
                    .service(
                        web::resource("/{assignment_id}/{date}")
                            .route(web::get().to(attendance::get_session)),
                    ),
            )
            .service(
                web::scope("/corrections")
                    .service(
                        web::resource("")
                            .route(web::post().to(manual_correction::create_correction)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(manual_correction::get_correction)),
                    )
                    .service(
                        web::resource("/{id}/decision")
                            .route(web::put().to(manual_correction::decide_correction)),
                    ),
            )
            .service(
                web::scope("/leave")
                    .service(web::resource("").route(web::post().to(leave_permit::create_leave)))
                    .service(web::resource("/{id}").route(web::get().to(leave_permit::get_leave)))
                    // /leave/{id}/review
                    .service(
                        web::resource("/{id}/review")
                            .route(web::put().to(leave_permit::review_leave)),
                    )
                    // /leave/{id}/decision
                    .service(
                        web::resource("/{id}/decision")
                            .route(web::put().to(leave_permit::decide_leave)),
                    )
                    // /leave/{id}/return
                    .service(
                        web::resource("/{id}/return")
                            .route(web::put().to(leave_permit::record_return)),
                    ),
            )
            .service(
                web::resource("/reconciliation")
                    .route(web::post().to(reconciliation::trigger_reconciliation)),
            ),
    );
}
