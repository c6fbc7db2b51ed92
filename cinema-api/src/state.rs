use cinema_core::booking::BookingService;
use cinema_core::catalog::CatalogService;
use cinema_core::identity::TokenVerifier;
use cinema_core::ticket::TicketIssuer;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<BookingService>,
    pub catalog: Arc<CatalogService>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub tickets: Arc<TicketIssuer>,
}
