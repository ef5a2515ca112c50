//! Four-byte ASCII message tags.
//!
//! Every datagram and every response frame starts with one of these. On the
//! wire a tag is just its four ASCII bytes, which is the same as writing the
//! little-endian `u32` whose bytes spell the tag.

use std::fmt;

/// Message tag (four ASCII bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self)
    }
}

// Agent movement
pub const TELEPORT: Tag = Tag(*b"TLPT");
pub const TELEPORT_STEPPED: Tag = Tag(*b"tlpt");
pub const ADD_FORCE_2D: Tag = Tag(*b"xBFF");
pub const ADD_FORCE_STEPPED: Tag = Tag(*b"fBff");
pub const ADD_FORCE_3D: Tag = Tag(*b"xBff");
pub const SET_POSE: Tag = Tag(*b"sPoS");

// Session and agent control
pub const SET_CAPTURE_RATE: Tag = Tag(*b"fScR");
pub const SET_HOVER_HEIGHT: Tag = Tag(*b"xSHh");
pub const RESPAWN: Tag = Tag(*b"RSPN");
pub const SET_COLLIDER: Tag = Tag(*b"sCOL");
pub const CHANGE_SCENE: Tag = Tag(*b"CScN");
pub const SET_SEED: Tag = Tag(*b"SEED");

// Spawned objects
pub const SPAWN_OBJECT: Tag = Tag(*b"oSpn");
pub const REMOVE_OBJECTS: Tag = Tag(*b"oRem");
pub const QUERY_OBJECTS: Tag = Tag(*b"oReq");

// Cameras
pub const IMAGE_REQUEST: Tag = Tag(*b"rIMG");
pub const IMAGE_WITH_METADATA: Tag = Tag(*b"tIMG");
pub const CAMERA_INFO: Tag = Tag(*b"gCaI");
pub const SET_CAMERA_PARAMS: Tag = Tag(*b"sCaR");
pub const SET_CAMERA_POSITION: Tag = Tag(*b"sCaP");
pub const SET_CAMERA_ROTATION: Tag = Tag(*b"sCaQ");

// Metadata
pub const METADATA_REQUEST: Tag = Tag(*b"rMET");

// Responses
pub const IMAGE_FRAME: Tag = Tag(*b"uImG");
pub const MULTI_IMAGE: Tag = Tag(*b"mult");
pub const CAMERA_INFO_RESPONSE: Tag = Tag(*b"cami");
pub const METADATA_RESPONSE: Tag = Tag(*b"meta");
pub const SCENE_RESPONSE: Tag = Tag(*b"scni");
pub const OBJECTS_RESPONSE: Tag = Tag(*b"obji");

// Pixel formats
pub const FORMAT_COMPRESSED_RGB: Tag = Tag(*b"cRGB");
pub const FORMAT_RGB: Tag = Tag(*b"xRGB");
pub const FORMAT_GRAY: Tag = Tag(*b"xGRY");
pub const FORMAT_FLOAT: Tag = Tag(*b"xFLT");
