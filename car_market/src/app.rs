use actix_jwt_auth_middleware::TokenSigner;
use actix_web::{error::InternalError, http::StatusCode, web};
use common::AuthUser;
use ed25519_compact::SecretKey;
use jwt_compact::alg::Ed25519;

use crate::handlers;

/// JWT authority verifying the session cookies and refreshing them with
/// `$signer`. Evaluates to the builder's `Result`.
macro_rules! market_authority {
    ($public_key:expr, $signer:expr) => {
        actix_jwt_auth_middleware::Authority::<common::AuthUser, jwt_compact::alg::Ed25519, _, _>::new()
            .refresh_authorizer(|| async move { Ok(()) })
            .token_signer(Some($signer))
            .verifying_key($public_key)
            .build()
    };
}

/// The whole application: public routes, then everything behind the JWT
/// cookie, with `/admin` further limited to superusers.
macro_rules! market_app {
    ($data:expr, $authority:expr) => {{
        use actix_jwt_auth_middleware::use_jwt::UseJWTOnApp;
        use actix_state_guards::UseStateGuardOnScope;

        actix_web::App::new()
            .app_data($data)
            .wrap(actix_web::middleware::Logger::new(
                "%a %t %r %s  %{Referer}i %Dms",
            ))
            .configure($crate::app::public_routes)
            .use_jwt(
                $authority,
                actix_web::web::scope("")
                    .configure($crate::app::member_routes)
                    .use_state_guard(
                        |user: common::AuthUser| async move { $crate::app::require_admin(&user) },
                        actix_web::web::scope("/admin").configure($crate::app::admin_routes),
                    ),
            )
    }};
}

/// Service over a fresh key pair. Returns the app and a signer for minting
/// session cookies.
#[cfg(test)]
macro_rules! test_app {
    ($state:expr) => {{
        let ed25519_compact::KeyPair { pk, sk } = ed25519_compact::KeyPair::generate();
        let signer = $crate::app::token_signer(sk.clone()).unwrap();
        let authority =
            market_authority!(pk, $crate::app::token_signer(sk).unwrap()).unwrap();
        let app = actix_web::test::init_service(market_app!($state, authority)).await;
        (app, signer)
    }};
}

pub fn token_signer(secret_key: SecretKey) -> anyhow::Result<TokenSigner<AuthUser, Ed25519>> {
    TokenSigner::new()
        .signing_key(secret_key)
        .algorithm(Ed25519)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create token signer: {:?}", e))
}

pub fn require_admin(user: &AuthUser) -> Result<(), InternalError<&'static str>> {
    if user.is_superuser {
        Ok(())
    } else {
        Err(InternalError::new(
            "You are not an Admin",
            StatusCode::FORBIDDEN,
        ))
    }
}

pub fn public_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::index)
        .service(handlers::register)
        .service(handlers::login)
        .service(handlers::search_cars)
        .service(handlers::get_car)
        .service(handlers::get_car_images)
        .service(handlers::get_packages)
        .service(handlers::get_package)
        .service(handlers::get_credit_parameters)
        .service(handlers::simulate_credit)
        .service(handlers::get_categories)
        .service(handlers::get_articles)
        .service(handlers::popular_articles)
        .service(handlers::featured_articles)
        .service(handlers::read_article)
        .service(handlers::get_file);
}

pub fn member_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::me)
        // listings
        .service(handlers::create_car)
        .service(handlers::update_car)
        .service(handlers::delete_car)
        .service(handlers::refresh_car)
        .service(handlers::add_car_image)
        .service(handlers::set_primary_car_image)
        .service(handlers::delete_car_image)
        .service(handlers::my_cars)
        .service(handlers::my_car_stats)
        .service(handlers::buy_package)
        .service(handlers::my_listing_payments)
        .service(handlers::upload_listing_proof)
        // purchases
        .service(handlers::book_car)
        .service(handlers::my_transactions)
        .service(handlers::get_transaction)
        .service(handlers::submit_booking_payment)
        .service(handlers::upload_payment_proof)
        .service(handlers::record_final_payment)
        .service(handlers::record_handover)
        .service(handlers::cancel_transaction)
        .service(handlers::request_refund)
        .service(handlers::reject_refund_request)
        .service(handlers::refund_booking_fee)
        // credit
        .service(handlers::save_simulation)
        .service(handlers::my_simulations)
        .service(handlers::my_simulation_stats)
        .service(handlers::get_simulation)
        .service(handlers::toggle_simulation_saved)
        .service(handlers::delete_simulation)
        .service(handlers::upload_file);
}

pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::admin_cars)
        .service(handlers::review_car)
        .service(handlers::package_stats)
        .service(handlers::admin_packages)
        .service(handlers::create_package)
        .service(handlers::update_package)
        .service(handlers::toggle_package)
        .service(handlers::delete_package)
        .service(handlers::admin_listing_payments)
        .service(handlers::verify_listing_payment)
        .service(handlers::admin_transactions)
        .service(handlers::confirm_booking_payment)
        .service(handlers::reject_payment)
        .service(handlers::payments_needing_verification)
        .service(handlers::rejected_payments)
        .service(handlers::get_payment_by_reference)
        .service(handlers::get_payments)
        .service(handlers::get_payment)
        .service(handlers::update_payment_status)
        .service(handlers::delete_payment)
        .service(handlers::admin_credit_parameters)
        .service(handlers::create_credit_parameter)
        .service(handlers::update_credit_parameter)
        .service(handlers::delete_credit_parameter)
        .service(handlers::create_category)
        .service(handlers::admin_articles)
        .service(handlers::admin_article)
        .service(handlers::create_article)
        .service(handlers::update_article)
        .service(handlers::delete_article)
        .service(handlers::delete_file)
        .service(handlers::run_sweep);
}
