//! XML text payloads for `cami`, `meta`, `scni` and `obji` responses.
//!
//! Clients parse these with a plain XML reader, so element names, attribute
//! quoting and the trailing newline of every line are part of the protocol.

use crate::core::camera::{CameraDescriptor, CameraRig};
use crate::core::types::{AgentState, Pose};
use std::fmt::Write;

/// Root element of camera info responses
pub const CAMERA_INFO_ROOT: &str = "TESSE_Agent_CameraInfo_v0.4";
/// Root element of agent metadata
pub const METADATA_ROOT: &str = "TESSE_Agent_Metadata_v0.5";

/// Camera info for one camera, every camera (`-1`), or an invalid-id notice.
pub fn camera_info(rig: &CameraRig, requested: i32) -> String {
    let mut out = format!("<{}>\n", CAMERA_INFO_ROOT);
    if requested == -1 {
        for cam in rig.cameras() {
            push_camera(&mut out, cam);
        }
    } else if let Some(cam) = rig.get(requested) {
        push_camera(&mut out, cam);
    } else {
        let _ = writeln!(out, "  <Cam ID {} is not a valid id!/>", requested);
    }
    let _ = writeln!(out, "</{}>", CAMERA_INFO_ROOT);
    out
}

fn push_camera(out: &mut String, cam: &CameraDescriptor) {
    let p = cam.position;
    let r = cam.rotation;
    let _ = write!(
        out,
        "  <camera_info>\n    <name>{}</name>\n    <id>{}</id>\n",
        cam.name, cam.id
    );
    let _ = writeln!(
        out,
        "    <parameters height='{}' width='{}' fov='{}'/>",
        cam.height, cam.width, cam.fov
    );
    let _ = writeln!(out, "    <position x='{}' y='{}' z='{}'/>", p.x, p.y, p.z);
    let _ = writeln!(
        out,
        "    <rotation x='{}' y='{}' z='{}' w='{}'/>",
        r.x, r.y, r.z, r.w
    );
    let _ = writeln!(
        out,
        "    <draw_distance near='{}' far='{}'/>",
        cam.near, cam.far
    );
    out.push_str("  </camera_info>\n");
}

/// Agent metadata. `collision` is the object hit since the last request,
/// only reported to clients that asked over the metadata or image channel.
pub fn metadata(state: &AgentState, collision: Option<&str>) -> String {
    let p = state.pose.position;
    let q = state.pose.rotation;
    let v = state.velocity;
    let w = state.angular_velocity;
    let a = state.acceleration;
    let aa = state.angular_acceleration;

    let mut out = format!("<{}>\n", METADATA_ROOT);
    let _ = writeln!(out, "  <position x='{}' y='{}' z='{}'/>", p.x, p.y, p.z);
    let _ = writeln!(
        out,
        "  <quaternion x='{}' y='{}' z='{}' w='{}'/>",
        q.x, q.y, q.z, q.w
    );
    let _ = writeln!(
        out,
        "  <velocity x_dot='{}' y_dot='{}' z_dot='{}'/>",
        v.x, v.y, v.z
    );
    let _ = writeln!(
        out,
        "  <angular_velocity x_ang_dot='{}' y_ang_dot='{}' z_ang_dot='{}'/>",
        w.x, w.y, w.z
    );
    let _ = writeln!(
        out,
        "  <acceleration x_ddot='{}' y_ddot='{}' z_ddot='{}'/>",
        a.x, a.y, a.z
    );
    let _ = writeln!(
        out,
        "  <angular_acceleration x_ang_ddot='{}' y_ang_ddot='{}' z_ang_ddot='{}'/>",
        aa.x, aa.y, aa.z
    );
    let _ = writeln!(out, "  <time>{}</time>", state.time as f32);
    match collision {
        Some(name) => {
            let _ = writeln!(out, "  <collision status='true' name='{}'/>", name);
        }
        None => out.push_str("  <collision status='false' name=''/>\n"),
    }
    let _ = writeln!(out, "  <collider status='{}'/>", state.collider_enabled);
    let _ = writeln!(out, "</{}>", METADATA_ROOT);
    out
}

/// Scene change acknowledgement
pub fn scene_info(index: usize, name: &str) -> String {
    format!(
        "<current_scene>\n  <index>{}</index>\n  <name>{}</name>\n</current_scene>\n",
        index, name
    )
}

/// Reply to an out-of-range scene index
pub fn scene_range(scene_count: usize) -> String {
    format!(
        "<available scene indices are 1 - {}/>\n",
        scene_count.saturating_sub(1)
    )
}

/// One row of the spawned object listing
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry<'a> {
    pub id: i32,
    pub kind: &'a str,
    pub pose: Pose,
}

/// Spawned object listing, in the order given
pub fn object_listing<'a>(entries: impl IntoIterator<Item = ObjectEntry<'a>>) -> String {
    let mut out = String::from("<objects>\n");
    for e in entries {
        let p = e.pose.position;
        let q = e.pose.rotation;
        let _ = write!(
            out,
            "  <object>\n    <type>{}</type>\n    <id>{}</id>\n",
            e.kind, e.id
        );
        let _ = writeln!(out, "    <position x='{}' y='{}' z='{}'/>", p.x, p.y, p.z);
        let _ = writeln!(
            out,
            "    <quaternion x='{}' y='{}' z='{}' w='{}'/>",
            q.x, q.y, q.z, q.w
        );
        out.push_str("  </object>\n");
    }
    out.push_str("</objects>\n");
    out
}
