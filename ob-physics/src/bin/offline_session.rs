use std::env;

use glam::{DVec3, Vec2};
use ob_physics::session::{PacketSinks, PhysicsSession};
use ob_physics::vehicle::Vehicle;
use ob_protocol::bedrock::UpstreamPacket;
use ob_protocol::java::DownstreamPacket;
use ob_protocol::shared::BlockPos;
use ob_world::palette::{BlockPalette, BlockState};
use ob_world::provider::MapWorld;

const RIDER_ID: u64 = 1;
const VEHICLE_ID: u64 = 2;

/// Drives one simulated session against an in-memory world and prints every
/// packet the engine would hand to the connection layer.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().without_time().compact().init();

    // Simple CLI: first arg is the vehicle kind (default boat), second arg
    // is the tick count
    let args: Vec<String> = env::args().collect();
    let kind = args.get(1).map(|s| s.as_str()).unwrap_or("boat");
    let ticks: u32 = args
        .get(2)
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(60);

    let (palette, world, spawn) = demo_scene(kind);
    let (sinks, upstream, downstream) = PacketSinks::unbounded();
    let mut session = PhysicsSession::new(palette, world, RIDER_ID, spawn, sinks);
    session.border_mut().set_size(48.0);

    let vehicle = match kind {
        "boat" => Vehicle::boat(VEHICLE_ID, spawn),
        "nautilus" => Vehicle::nautilus(VEHICLE_ID, spawn),
        "strider" => Vehicle::strider(VEHICLE_ID, spawn),
        "pig" => Vehicle::pig(VEHICLE_ID, spawn),
        "horse" => Vehicle::horse(VEHICLE_ID, spawn),
        "camel" => Vehicle::camel(VEHICLE_ID, spawn),
        "happy_ghast" | "ghast" => Vehicle::happy_ghast(VEHICLE_ID, spawn),
        other => {
            return Err(format!(
                "unknown vehicle {other}, expected boat|nautilus|strider|pig|horse|camel|happy_ghast"
            )
            .into());
        }
    };
    session.mount(vehicle);

    // Hold the stick forward the whole run.
    session.set_input(Vec2::new(0.0, 1.0));

    for tick in 0..ticks {
        // Scripted rider events to touch the event surface.
        match (kind, tick) {
            ("pig" | "strider", 10) => session.start_boost(40),
            ("horse" | "camel", 30) => session.set_jump_charge(90),
            _ => {}
        }

        session.tick();

        for packet in upstream.try_iter() {
            println!("tick {:3} up   {}", tick, describe_upstream(&packet));
        }
        for packet in downstream.try_iter() {
            println!("tick {:3} down {}", tick, describe_downstream(&packet));
        }

        if tick % 10 == 9 {
            if let Some(vehicle) = session.vehicle() {
                let position = vehicle.state().position();
                println!(
                    "tick {:3} -- {} at ({:.3}, {:.3}, {:.3}) ground={}",
                    tick,
                    vehicle.name(),
                    position.x,
                    position.y,
                    position.z,
                    vehicle.state().on_ground
                );
            }
        }
    }

    session.dismount();
    Ok(())
}

/// Palette, terrain, and spawn point for the chosen vehicle: a stone basin
/// with a pond on one side and a lava pool on the other.
fn demo_scene(kind: &str) -> (BlockPalette, MapWorld, DVec3) {
    let palette = BlockPalette::new(vec![
        BlockState::default(),
        BlockState::solid("minecraft:stone"),
        BlockState::water(0),
        BlockState::lava(0),
        BlockState::solid("minecraft:slime_block"),
    ]);

    let mut world = MapWorld::new();
    world.fill(BlockPos::new(-24, -1, -24), BlockPos::new(24, -1, 24), 1);
    // Pond in the negative quadrant, lava pool in the positive one.
    world.fill(BlockPos::new(-20, 0, -20), BlockPos::new(-4, 0, -4), 2);
    world.fill(BlockPos::new(4, 0, 4), BlockPos::new(20, 0, 20), 3);
    // A one-block ridge across the dry lane; tall mounts step it, short
    // ones stop.
    world.fill(BlockPos::new(-2, 0, 8), BlockPos::new(2, 0, 8), 1);

    let spawn = match kind {
        "boat" | "nautilus" => DVec3::new(-12.5, 0.4, -12.5),
        "strider" => DVec3::new(12.5, 0.5, 12.5),
        _ => DVec3::new(0.5, 0.0, 0.5),
    };
    (palette, world, spawn)
}

fn describe_upstream(packet: &UpstreamPacket) -> String {
    match packet {
        UpstreamPacket::MoveDelta(delta) => format!(
            "MoveDelta x={:?} y={:?} z={:?} ground={}",
            delta.x, delta.y, delta.z, delta.on_ground
        ),
        UpstreamPacket::LevelEvent(event) => format!(
            "LevelEvent {:?} at ({:.1}, {:.1}, {:.1})",
            event.kind, event.position.x, event.position.y, event.position.z
        ),
        other => format!("{:?}", other),
    }
}

fn describe_downstream(packet: &DownstreamPacket) -> String {
    match packet {
        DownstreamPacket::MoveVehicle(report) => format!(
            "MoveVehicle ({:.3}, {:.3}, {:.3}) yaw={:.1} ground={}",
            report.position.x, report.position.y, report.position.z, report.yaw, report.on_ground
        ),
        other => format!("{:?}", other),
    }
}
