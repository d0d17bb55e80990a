//! Device discovery: Who-Is and I-Am.

use anyhow::anyhow;

use bacstack_core::{
    Address, Apdu, ApduBody, AppError, IAmRequest, LocalDevice, ServiceFailure, UnconfirmedRequest,
    UnconfirmedServiceChoice, WhoIsRequest,
};

use super::instance_in_range;
use crate::application::ApplicationCore;
use crate::service::{Capability, ServiceTable};

/// Answers Who-Is with I-Am and records every I-Am heard in the device
/// information cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhoIsIAmServices;

impl Capability for WhoIsIAmServices {
    fn install(&self, table: &mut ServiceTable) {
        table.register_fn(UnconfirmedServiceChoice::WhoIs, Self::do_who_is);
        table.register_fn(UnconfirmedServiceChoice::IAm, Self::do_i_am);
    }
}

impl WhoIsIAmServices {
    /// Ask devices within the limits to announce themselves. Without a
    /// destination the request is broadcast globally.
    pub fn who_is(
        app: &mut ApplicationCore,
        low_limit: Option<u32>,
        high_limit: Option<u32>,
        destination: Option<Address>,
    ) -> Result<(), AppError> {
        let destination = destination.unwrap_or(Address::GlobalBroadcast);
        tracing::debug!(%destination, ?low_limit, ?high_limit, "who-is");
        app.request(Apdu::unconfirmed(
            destination,
            UnconfirmedRequest::WhoIs(WhoIsRequest {
                low_limit,
                high_limit,
            }),
        ))?;
        Ok(())
    }

    /// Announce the local device.
    pub fn i_am(app: &mut ApplicationCore, destination: Option<Address>) -> Result<(), AppError> {
        let device = app.local_device().ok_or(AppError::NoLocalDevice)?;
        let announcement = announcement(device);
        let destination = destination.unwrap_or(Address::GlobalBroadcast);
        tracing::debug!(%destination, device = %announcement.device_identifier, "i-am");
        app.request(Apdu::unconfirmed(
            destination,
            UnconfirmedRequest::IAm(announcement),
        ))?;
        Ok(())
    }

    fn do_who_is(app: &mut ApplicationCore, apdu: &Apdu) -> Result<(), ServiceFailure> {
        let ApduBody::UnconfirmedRequest(UnconfirmedRequest::WhoIs(who_is)) = &apdu.body else {
            return Err(anyhow!("who-is without decoded parameters").into());
        };
        let Some(instance) = app.local_device().map(|device| device.instance()) else {
            return Ok(());
        };
        if !instance_in_range(who_is.low_limit, who_is.high_limit, instance)? {
            return Ok(());
        }
        Self::i_am(app, Some(apdu.source.clone()))?;
        Ok(())
    }

    fn do_i_am(app: &mut ApplicationCore, apdu: &Apdu) -> Result<(), ServiceFailure> {
        let ApduBody::UnconfirmedRequest(UnconfirmedRequest::IAm(i_am)) = &apdu.body else {
            return Err(anyhow!("i-am without decoded parameters").into());
        };
        app.device_info_mut().ingest(&apdu.source, i_am)?;
        tracing::trace!(source = %apdu.source, device = %i_am.device_identifier, "i-am recorded");
        Ok(())
    }
}

fn announcement(device: &LocalDevice) -> IAmRequest {
    IAmRequest {
        device_identifier: device.object_identifier,
        max_apdu_length_accepted: device.max_apdu_length_accepted,
        segmentation_supported: device.segmentation_supported,
        vendor_id: device.vendor_id,
    }
}
