use ferry_daemon::http_server::api::client::{ApiClient, ApiError};
use ferry_daemon::http_server::api::v0::fs::{FsCloseRequest, FsFailure};
use ferry_daemon::proxy::Fd;

pub mod cat;
pub mod health;
pub mod proxy;
pub mod put;
pub mod store;
pub mod version;

pub use self::cat::Cat;
pub use self::health::Health;
pub use self::proxy::Proxy;
pub use self::put::Put;
pub use self::store::Store;
pub use self::version::Version;

/// Close `fd` once `transfer` is done with it. If the transfer failed, its
/// error is returned and the close is best effort.
pub(crate) async fn close_after<T, E>(
    client: &ApiClient,
    fd: Fd,
    transfer: Result<T, E>,
) -> Result<T, E>
where
    E: From<ApiError> + From<FsFailure>,
{
    let closed = client.call(FsCloseRequest { fd }).await;
    match transfer {
        Ok(value) => {
            closed?.into_result()?;
            Ok(value)
        }
        Err(err) => {
            match closed.map(|reply| reply.into_result()) {
                Ok(Ok(_)) => {}
                Ok(Err(failure)) => tracing::warn!(fd, %failure, "close after failed transfer"),
                Err(e) => tracing::warn!(fd, error = %e, "close after failed transfer"),
            }
            Err(err)
        }
    }
}
