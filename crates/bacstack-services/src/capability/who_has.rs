//! Object discovery: Who-Has and I-Have.

use anyhow::anyhow;

use bacstack_core::{
    Address, Apdu, ApduBody, AppError, IHaveRequest, ObjectIdentifier, ServiceFailure,
    UnconfirmedRequest, UnconfirmedServiceChoice, WhoHasObject, WhoHasRequest,
};

use super::instance_in_range;
use crate::application::ApplicationCore;
use crate::service::{Capability, ServiceTable};

/// Answers Who-Has for objects this application hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhoHasIHaveServices;

impl Capability for WhoHasIHaveServices {
    fn install(&self, table: &mut ServiceTable) {
        table.register_fn(UnconfirmedServiceChoice::WhoHas, Self::do_who_has);
    }
}

impl WhoHasIHaveServices {
    /// Ask devices within the limits whether they host `object`.
    pub fn who_has(
        app: &mut ApplicationCore,
        low_limit: Option<u32>,
        high_limit: Option<u32>,
        object: WhoHasObject,
        destination: Option<Address>,
    ) -> Result<(), AppError> {
        let destination = destination.unwrap_or(Address::GlobalBroadcast);
        tracing::debug!(%destination, ?object, "who-has");
        app.request(Apdu::unconfirmed(
            destination,
            UnconfirmedRequest::WhoHas(WhoHasRequest {
                low_limit,
                high_limit,
                object,
            }),
        ))?;
        Ok(())
    }

    /// Announce that the local device hosts `object`.
    pub fn i_have(
        app: &mut ApplicationCore,
        object: ObjectIdentifier,
        destination: Option<Address>,
    ) -> Result<(), AppError> {
        let device = app.local_device().ok_or(AppError::NoLocalDevice)?;
        let hosted = app
            .get_object_by_id(object)
            .ok_or(AppError::UnknownObject(object))?;
        let announcement = IHaveRequest {
            device_identifier: device.object_identifier,
            object_identifier: object,
            object_name: hosted.object_name().to_string(),
        };
        app.request(Apdu::unconfirmed(
            destination.unwrap_or(Address::GlobalBroadcast),
            UnconfirmedRequest::IHave(announcement),
        ))?;
        Ok(())
    }

    fn do_who_has(app: &mut ApplicationCore, apdu: &Apdu) -> Result<(), ServiceFailure> {
        let ApduBody::UnconfirmedRequest(UnconfirmedRequest::WhoHas(who_has)) = &apdu.body else {
            return Err(anyhow!("who-has without decoded parameters").into());
        };
        let Some(instance) = app.local_device().map(|device| device.instance()) else {
            return Ok(());
        };
        if !instance_in_range(who_has.low_limit, who_has.high_limit, instance)? {
            return Ok(());
        }

        let hosted = match &who_has.object {
            WhoHasObject::Name(name) => app.get_object_by_name(name),
            WhoHasObject::Identifier(id) => app.get_object_by_id(*id),
        };
        let Some(id) = hosted.map(|object| object.object_identifier()) else {
            tracing::trace!(object = ?who_has.object, "who-has for object not hosted here");
            return Ok(());
        };
        Self::i_have(app, id, Some(apdu.source.clone()))?;
        Ok(())
    }
}
