//! Modbus request handling against the coil bank.

use std::future;

use coilcast_common::CoilBank;
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

/// Largest quantity a single Read Coils request may ask for.
pub const MAX_READ_COILS: u16 = 2000;

/// Serves Read Coils (function code 1) from a shared [`CoilBank`].
///
/// One instance is created per connection; all instances share the bank.
#[derive(Debug, Clone)]
pub struct CoilService {
    bank: CoilBank,
}

impl CoilService {
    pub fn new(bank: CoilBank) -> Self {
        Self { bank }
    }

    /// Answer a single request.
    pub fn handle(&self, req: Request<'_>) -> Result<Response, ExceptionCode> {
        match req {
            Request::ReadCoils(addr, cnt) => {
                debug!(addr, cnt, "Read coils");

                if cnt == 0 || cnt > MAX_READ_COILS {
                    warn!(addr, cnt, "Rejected read: illegal quantity");
                    return Err(ExceptionCode::IllegalDataValue);
                }

                self.bank.read(addr, cnt).map(Response::ReadCoils).map_err(|e| {
                    warn!(error = %e, "Rejected read: illegal address");
                    ExceptionCode::IllegalDataAddress
                })
            }
            _ => {
                warn!("Exception::IllegalFunction - unsupported request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        }
    }
}

impl tokio_modbus::server::Service for CoilService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.handle(req))
    }
}
