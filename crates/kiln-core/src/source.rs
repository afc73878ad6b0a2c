// ── Telemetry source seam ──
//
// The coordinator is generic over where readings come from. Production
// uses `KilnClient`; tests script a source by hand.

use std::future::Future;

use kiln_api::{Credentials, KilnClient, KilnInfo, RawPayload, SessionToken};

/// The three vendor operations the coordinator needs.
///
/// Errors stay as `kiln_api::Error` so the coordinator can tell a
/// rejected session apart from everything else.
pub trait TelemetrySource: Send + Sync + 'static {
    fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<SessionToken, kiln_api::Error>> + Send;

    fn list_kilns(
        &self,
        token: &SessionToken,
    ) -> impl Future<Output = Result<Vec<KilnInfo>, kiln_api::Error>> + Send;

    fn fetch_status(
        &self,
        token: &SessionToken,
        kiln_id: &str,
    ) -> impl Future<Output = Result<RawPayload, kiln_api::Error>> + Send;
}

impl TelemetrySource for KilnClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionToken, kiln_api::Error> {
        KilnClient::authenticate(self, credentials).await
    }

    async fn list_kilns(&self, token: &SessionToken) -> Result<Vec<KilnInfo>, kiln_api::Error> {
        KilnClient::list_kilns(self, token).await
    }

    async fn fetch_status(
        &self,
        token: &SessionToken,
        kiln_id: &str,
    ) -> Result<RawPayload, kiln_api::Error> {
        KilnClient::fetch_status(self, token, kiln_id).await
    }
}
