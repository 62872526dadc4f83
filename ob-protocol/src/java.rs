//! Downstream message shapes: position reports toward the Java server.
//!
//! The Java protocol is big-endian with doubles for positions. Packet ids are
//! version-dependent and owned by the connection layer; only bodies are
//! encoded here.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use glam::DVec3;
use std::io::{Read, Write};

use crate::codec::{ProtocolError, Serializable};

#[derive(Clone, Debug, PartialEq)]
pub enum DownstreamPacket {
    MoveVehicle(MoveVehicle),
    PlayerPosition(PlayerPosition),
}

/// Absolute vehicle position report, sent once per tick while the proxy is
/// simulating the vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveVehicle {
    pub position: DVec3,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl Serializable for MoveVehicle {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        write_dvec3(w, self.position)?;
        w.write_f32::<BigEndian>(self.yaw)?;
        w.write_f32::<BigEndian>(self.pitch)?;
        w.write_u8(self.on_ground as u8)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        Ok(MoveVehicle {
            position: read_dvec3(r)?,
            yaw: r.read_f32::<BigEndian>()?,
            pitch: r.read_f32::<BigEndian>()?,
            on_ground: r.read_u8()? != 0,
        })
    }
}

/// Player position + look report, used when piston displacement moves the
/// rider outside the positions the client has claimed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerPosition {
    pub position: DVec3,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl Serializable for PlayerPosition {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        write_dvec3(w, self.position)?;
        w.write_f32::<BigEndian>(self.yaw)?;
        w.write_f32::<BigEndian>(self.pitch)?;
        w.write_u8(self.on_ground as u8)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        Ok(PlayerPosition {
            position: read_dvec3(r)?,
            yaw: r.read_f32::<BigEndian>()?,
            pitch: r.read_f32::<BigEndian>()?,
            on_ground: r.read_u8()? != 0,
        })
    }
}

fn write_dvec3<W: Write>(w: &mut W, v: DVec3) -> Result<(), ProtocolError> {
    w.write_f64::<BigEndian>(v.x)?;
    w.write_f64::<BigEndian>(v.y)?;
    w.write_f64::<BigEndian>(v.z)?;
    Ok(())
}

fn read_dvec3<R: Read>(r: &mut R) -> Result<DVec3, ProtocolError> {
    Ok(DVec3::new(
        r.read_f64::<BigEndian>()?,
        r.read_f64::<BigEndian>()?,
        r.read_f64::<BigEndian>()?,
    ))
}
