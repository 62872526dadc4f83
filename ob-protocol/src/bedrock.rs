//! Upstream message shapes: what the engine sends toward the Bedrock client.
//!
//! Bodies are encoded little-endian with varint framing where the protocol
//! uses it. Version-specific numeric tables (runtime block ids, level-event
//! particle ids) are owned by the connection layer, which translates the
//! typed fields below before the bytes leave the proxy.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use std::io::{Read, Write};

use crate::codec::{
    ProtocolError, Serializable, read_varuint32, read_varuint64, write_varuint32, write_varuint64,
};
use crate::shared::BlockPos;

pub const DELTA_HAS_X: u16 = 0x1;
pub const DELTA_HAS_Y: u16 = 0x2;
pub const DELTA_HAS_Z: u16 = 0x4;
pub const DELTA_HAS_PITCH: u16 = 0x8;
pub const DELTA_HAS_YAW: u16 = 0x10;
pub const DELTA_HAS_HEAD_YAW: u16 = 0x20;
pub const DELTA_ON_GROUND: u16 = 0x40;

/// Block update flag: also refresh the block's neighbors client-side.
pub const UPDATE_BLOCK_NEIGHBORS: u32 = 0x1;
/// Block update flag: broadcast to the network without neighbor updates.
pub const UPDATE_BLOCK_NETWORK: u32 = 0x2;

#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamPacket {
    MoveDelta(MoveEntityDelta),
    MovePlayer(MovePlayer),
    SetMotion(SetEntityMotion),
    LevelEvent(LevelEvent),
    UpdateBlock(UpdateBlock),
    PistonArm(PistonArmUpdate),
    MovingBlock(MovingBlockUpdate),
}

/// Sparse per-tick entity move: only fields that changed since the last
/// report are present. An all-empty delta is never sent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveEntityDelta {
    pub runtime_id: u64,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub pitch: Option<f32>,
    pub yaw: Option<f32>,
    pub head_yaw: Option<f32>,
    pub on_ground: bool,
}

impl MoveEntityDelta {
    pub fn is_empty(&self) -> bool {
        self.flags() == 0
    }

    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.x.is_some() {
            flags |= DELTA_HAS_X;
        }
        if self.y.is_some() {
            flags |= DELTA_HAS_Y;
        }
        if self.z.is_some() {
            flags |= DELTA_HAS_Z;
        }
        if self.pitch.is_some() {
            flags |= DELTA_HAS_PITCH;
        }
        if self.yaw.is_some() {
            flags |= DELTA_HAS_YAW;
        }
        if self.head_yaw.is_some() {
            flags |= DELTA_HAS_HEAD_YAW;
        }
        if self.on_ground {
            flags |= DELTA_ON_GROUND;
        }
        flags
    }
}

impl Serializable for MoveEntityDelta {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        write_varuint64(w, self.runtime_id)?;
        w.write_u16::<LittleEndian>(self.flags())?;
        for coord in [self.x, self.y, self.z].into_iter().flatten() {
            w.write_f32::<LittleEndian>(coord)?;
        }
        for rot in [self.pitch, self.yaw, self.head_yaw].into_iter().flatten() {
            w.write_u8(rotation_to_byte(rot))?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        let runtime_id = read_varuint64(r)?;
        let flags = r.read_u16::<LittleEndian>()?;
        let coord = |flag: u16, r: &mut R| -> Result<Option<f32>, ProtocolError> {
            if flags & flag != 0 {
                Ok(Some(r.read_f32::<LittleEndian>()?))
            } else {
                Ok(None)
            }
        };
        let x = coord(DELTA_HAS_X, r)?;
        let y = coord(DELTA_HAS_Y, r)?;
        let z = coord(DELTA_HAS_Z, r)?;
        let rot = |flag: u16, r: &mut R| -> Result<Option<f32>, ProtocolError> {
            if flags & flag != 0 {
                Ok(Some(rotation_from_byte(r.read_u8()?)))
            } else {
                Ok(None)
            }
        };
        let pitch = rot(DELTA_HAS_PITCH, r)?;
        let yaw = rot(DELTA_HAS_YAW, r)?;
        let head_yaw = rot(DELTA_HAS_HEAD_YAW, r)?;
        Ok(MoveEntityDelta {
            runtime_id,
            x,
            y,
            z,
            pitch,
            yaw,
            head_yaw,
            on_ground: flags & DELTA_ON_GROUND != 0,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveMode {
    Normal,
    Teleport,
}

/// Absolute player move, used for piston displacement corrections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovePlayer {
    pub runtime_id: u64,
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub head_yaw: f32,
    pub mode: MoveMode,
    pub on_ground: bool,
}

impl Serializable for MovePlayer {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        write_varuint64(w, self.runtime_id)?;
        write_vec3(w, self.position)?;
        w.write_f32::<LittleEndian>(self.pitch)?;
        w.write_f32::<LittleEndian>(self.yaw)?;
        w.write_f32::<LittleEndian>(self.head_yaw)?;
        w.write_u8(match self.mode {
            MoveMode::Normal => 0,
            MoveMode::Teleport => 2,
        })?;
        w.write_u8(self.on_ground as u8)?;
        // Ridden runtime id; the physics session never moves a ridden player.
        write_varuint64(w, 0)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        let runtime_id = read_varuint64(r)?;
        let position = read_vec3(r)?;
        let pitch = r.read_f32::<LittleEndian>()?;
        let yaw = r.read_f32::<LittleEndian>()?;
        let head_yaw = r.read_f32::<LittleEndian>()?;
        let mode = match r.read_u8()? {
            0 => MoveMode::Normal,
            2 => MoveMode::Teleport,
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "unknown move mode {other}"
                )));
            }
        };
        let on_ground = r.read_u8()? != 0;
        read_varuint64(r)?;
        Ok(MovePlayer {
            runtime_id,
            position,
            pitch,
            yaw,
            head_yaw,
            mode,
            on_ground,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetEntityMotion {
    pub runtime_id: u64,
    pub motion: Vec3,
}

impl Serializable for SetEntityMotion {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        write_varuint64(w, self.runtime_id)?;
        write_vec3(w, self.motion)
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        Ok(SetEntityMotion {
            runtime_id: read_varuint64(r)?,
            motion: read_vec3(r)?,
        })
    }
}

/// World effect kinds this engine emits. The connection layer maps these to
/// the session protocol version's level-event ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelEventKind {
    /// The red-slash "deny" dust used for world border walls.
    ParticleDenyBlock,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelEvent {
    pub kind: LevelEventKind,
    pub position: Vec3,
    /// Packed 0xRRGGBB tint for particles that take one.
    pub data: i32,
}

impl Serializable for LevelEvent {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        w.write_u8(match self.kind {
            LevelEventKind::ParticleDenyBlock => 0,
        })?;
        write_vec3(w, self.position)?;
        w.write_i32::<LittleEndian>(self.data)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        let kind = match r.read_u8()? {
            0 => LevelEventKind::ParticleDenyBlock,
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "unknown level event {other}"
                )));
            }
        };
        Ok(LevelEvent {
            kind,
            position: read_vec3(r)?,
            data: r.read_i32::<LittleEndian>()?,
        })
    }
}

/// Single block swap. `block` is the Java state id; the connection layer owns
/// the Java-to-Bedrock runtime id mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateBlock {
    pub position: BlockPos,
    pub block: u32,
    pub layer: u32,
    pub flags: u32,
}

impl Serializable for UpdateBlock {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError> {
        write_block_pos(w, self.position)?;
        write_varuint32(w, self.block)?;
        write_varuint32(w, self.flags)?;
        write_varuint32(w, self.layer)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError> {
        let position = read_block_pos(r)?;
        let block = read_varuint32(r)?;
        let flags = read_varuint32(r)?;
        let layer = read_varuint32(r)?;
        Ok(UpdateBlock {
            position,
            block,
            layer,
            flags,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PistonArmState {
    Retracted,
    Extending,
    Extended,
    Retracting,
}

impl PistonArmState {
    pub fn as_byte(&self) -> u8 {
        match *self {
            PistonArmState::Retracted => 0,
            PistonArmState::Extending => 1,
            PistonArmState::Extended => 2,
            PistonArmState::Retracting => 3,
        }
    }
}

/// Piston arm visual state. Crosses the boundary as typed data; the
/// connection layer renders it into the client's block-entity encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct PistonArmUpdate {
    pub position: BlockPos,
    pub progress: f32,
    pub last_progress: f32,
    pub state: PistonArmState,
    pub sticky: bool,
    pub attached: Vec<BlockPos>,
}

/// Placeholder for a block mid-transit under a piston, keyed back to the
/// piston that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovingBlockUpdate {
    pub position: BlockPos,
    pub moved_block: u32,
    pub piston: BlockPos,
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> Result<(), ProtocolError> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)?;
    Ok(())
}

fn read_vec3<R: Read>(r: &mut R) -> Result<Vec3, ProtocolError> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn write_block_pos<W: Write>(w: &mut W, pos: BlockPos) -> Result<(), ProtocolError> {
    crate::codec::write_varint32(w, pos.x)?;
    write_varuint32(w, pos.y as u32)?;
    crate::codec::write_varint32(w, pos.z)?;
    Ok(())
}

fn read_block_pos<R: Read>(r: &mut R) -> Result<BlockPos, ProtocolError> {
    let x = crate::codec::read_varint32(r)?;
    let y = read_varuint32(r)? as i32;
    let z = crate::codec::read_varint32(r)?;
    Ok(BlockPos::new(x, y, z))
}

/// Bedrock packs rotations into a single byte of 360/256-degree steps.
fn rotation_to_byte(deg: f32) -> u8 {
    ((deg * 256.0 / 360.0).round() as i32 & 0xff) as u8
}

fn rotation_from_byte(byte: u8) -> f32 {
    byte as f32 * 360.0 / 256.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn delta_flags_follow_fields() {
        let mut delta = MoveEntityDelta {
            runtime_id: 7,
            ..Default::default()
        };
        assert!(delta.is_empty());

        delta.y = Some(64.5);
        delta.on_ground = true;
        assert_eq!(delta.flags(), DELTA_HAS_Y | DELTA_ON_GROUND);
        assert!(!delta.is_empty());
    }

    #[test]
    fn sparse_delta_omits_absent_fields() {
        let delta = MoveEntityDelta {
            runtime_id: 1,
            x: Some(10.0),
            z: Some(-3.25),
            yaw: Some(90.0),
            on_ground: true,
            ..Default::default()
        };

        let mut buf = Vec::new();
        delta.write_to(&mut buf).unwrap();
        // id + flags + two coords + one rotation byte
        assert_eq!(buf.len(), 1 + 2 + 8 + 1);

        let decoded = MoveEntityDelta::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn rotation_byte_steps() {
        assert_eq!(rotation_to_byte(0.0), 0);
        assert_eq!(rotation_to_byte(90.0), 64);
        assert_eq!(rotation_to_byte(-90.0), 192);
        assert_eq!(rotation_from_byte(64), 90.0);
    }
}
