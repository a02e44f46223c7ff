//! Facade: the per-service set of lifecycle and session callbacks.
//!
//! Every method has an empty default, so a facade only implements the events
//! it cares about. A missing callback is never an error.

use std::time::Duration;

use crate::core::packet::RawPacket;
use crate::protocol::context::ServiceContext;
use crate::protocol::event::{AsyncConnResult, ProtoReport, SessionDestroyInfo, SessionInfo};

pub trait Facade: Send {
    fn on_initialize(&mut self, _ctx: &mut ServiceContext<'_>) {}

    fn on_start(&mut self, _ctx: &mut ServiceContext<'_>) {}

    fn on_stop(&mut self, _ctx: &mut ServiceContext<'_>) {}

    fn on_destroy(&mut self, _ctx: &mut ServiceContext<'_>) {}

    fn on_update(&mut self, _ctx: &mut ServiceContext<'_>) {}

    fn on_idle(&mut self, _ctx: &mut ServiceContext<'_>, _idle_time: Duration) {}

    fn on_session_create(&mut self, _ctx: &mut ServiceContext<'_>, _info: &SessionInfo) {}

    fn on_session_destroy(&mut self, _ctx: &mut ServiceContext<'_>, _info: &SessionDestroyInfo) {}

    fn on_async_conn_result(&mut self, _ctx: &mut ServiceContext<'_>, _result: &AsyncConnResult) {}

    fn on_proto_report(&mut self, _ctx: &mut ServiceContext<'_>, _report: &ProtoReport) {}

    /// A packet arrived for an opcode nobody registered.
    fn on_unhandled_packet(&mut self, _ctx: &mut ServiceContext<'_>, _packet: &RawPacket) {}
}
