pub mod ingress;
pub mod server;

pub use ingress::router;
pub use server::serve;
