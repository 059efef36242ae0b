//! HMAC middleware for Actix Web.
//!
//! Payment providers sign every webhook delivery with HMAC-SHA256 over the raw request body, using the shared
//! webhook secret, and put the base64 signature in the `X-Payment-Signature` header. Wrapping the webhook scope
//! with this middleware guarantees that no handler ever sees an unverified payload.
//!
//! Verification happens on the raw bytes, before any parsing. A missing or mismatching signature is rejected with
//! 401 and a security alert in the log, and no state changes.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use acp_common::Secret;
use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorBadRequest,
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{errors::ServerError, helpers::calculate_hmac};

pub struct HmacMiddlewareFactory {
    hmac_header: String,
    key: Secret<String>,
    // If false, then the middleware will not check the HMAC signature and always allow the call
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(hmac_header: &str, key: Secret<String>, enabled: bool) -> Self {
        HmacMiddlewareFactory { hmac_header: hmac_header.into(), key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            hmac_header: self.hmac_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    hmac_header: String,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.expose().clone();
        let hmac_header = self.hmac_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking HMAC for request");
            if !enabled {
                trace!("🔐️ HMAC checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let hmac_calc = calculate_hmac(&secret, data.as_ref());
            let hmac = req.headers().get(&hmac_header).ok_or_else(|| {
                warn!("🚨️ Webhook request without a signature from {:?}. Denying access.", req.connection_info().peer_addr());
                ServerError::InvalidSignature
            })?;
            let validated = hmac == hmac_calc.as_str();
            if validated {
                trace!("🔐️ HMAC check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!(
                    "🚨️ Webhook request with an invalid signature from {:?}. Denying access.",
                    req.connection_info().peer_addr()
                );
                Err(ServerError::InvalidSignature.into())
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}

#[cfg(test)]
mod test {
    use actix_web::{http::StatusCode, post, test, App, HttpResponse, Responder};

    use super::*;

    #[post("/webhook")]
    async fn echo(body: web::Bytes) -> impl Responder {
        HttpResponse::Ok().body(body)
    }

    fn factory(enabled: bool) -> HmacMiddlewareFactory {
        HmacMiddlewareFactory::new("X-Payment-Signature", Secret::new("s3cret".to_string()), enabled)
    }

    #[actix_web::test]
    async fn correctly_signed_requests_pass_with_body_intact() {
        let app = test::init_service(App::new().service(web::scope("").wrap(factory(true)).service(echo))).await;
        let body = br#"{"order_id":"oid-1"}"#;
        let sig = calculate_hmac("s3cret", body);
        let req = test::TestRequest::post()
            .uri("/webhook")
            .insert_header(("X-Payment-Signature", sig))
            .set_payload(body.to_vec())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let echoed = test::read_body(resp).await;
        assert_eq!(echoed.as_ref(), body);
    }

    #[actix_web::test]
    async fn unsigned_and_mis_signed_requests_are_rejected() {
        let app = test::init_service(App::new().service(web::scope("").wrap(factory(true)).service(echo))).await;
        let body = br#"{"order_id":"oid-1"}"#;

        let req = test::TestRequest::post().uri("/webhook").set_payload(body.to_vec()).to_request();
        let err = test::try_call_service(&app, req).await.expect_err("unsigned request should be rejected");
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);

        let sig = calculate_hmac("wrong-secret", body);
        let req = test::TestRequest::post()
            .uri("/webhook")
            .insert_header(("X-Payment-Signature", sig))
            .set_payload(body.to_vec())
            .to_request();
        let err = test::try_call_service(&app, req).await.expect_err("mis-signed request should be rejected");
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn disabled_checks_let_everything_through() {
        let app = test::init_service(App::new().service(web::scope("").wrap(factory(false)).service(echo))).await;
        let req = test::TestRequest::post().uri("/webhook").set_payload("unsigned").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
