use std::fmt;

/// Which of the three lighting-map tables a texture belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapKind {
    Material,
    Normal,
    Surface,
}

impl MapKind {
    pub const ALL: [MapKind; 3] = [MapKind::Material, MapKind::Normal, MapKind::Surface];

    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            MapKind::Material => 0,
            MapKind::Normal => 1,
            MapKind::Surface => 2,
        }
    }

    pub fn parse(raw: &str) -> Option<MapKind> {
        match raw {
            "material" => Some(MapKind::Material),
            "normal" => Some(MapKind::Normal),
            "surface" => Some(MapKind::Surface),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            MapKind::Material => "material",
            MapKind::Normal => "normal",
            MapKind::Surface => "surface",
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of renderable part a texture is intended for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectRole {
    Ship,
    Turret,
    TurretBarrel,
    TurretUnder,
    TurretCoverSmall,
    TurretCoverMedium,
    TurretCoverLarge,
    Hardpoint,
    HardpointBarrel,
    HardpointUnder,
    HardpointCoverSmall,
    HardpointCoverMedium,
    HardpointCoverLarge,
    Missile,
    Asteroid,
}

impl ObjectRole {
    /// Only turrets and hardpoints carry per-frame sprite sheets; every other
    /// role canonicalizes to frame 0.
    #[inline(always)]
    pub const fn animated(self) -> bool {
        matches!(self, ObjectRole::Turret | ObjectRole::Hardpoint)
    }

    pub fn parse(raw: &str) -> Option<ObjectRole> {
        match raw {
            "ship" => Some(ObjectRole::Ship),
            "turret" => Some(ObjectRole::Turret),
            "turretbarrel" => Some(ObjectRole::TurretBarrel),
            "turretunder" => Some(ObjectRole::TurretUnder),
            "turretcoversmall" => Some(ObjectRole::TurretCoverSmall),
            "turretcovermedium" => Some(ObjectRole::TurretCoverMedium),
            "turretcoverlarge" => Some(ObjectRole::TurretCoverLarge),
            "hardpoint" => Some(ObjectRole::Hardpoint),
            "hardpointbarrel" => Some(ObjectRole::HardpointBarrel),
            "hardpointunder" => Some(ObjectRole::HardpointUnder),
            "hardpointcoversmall" => Some(ObjectRole::HardpointCoverSmall),
            "hardpointcovermedium" => Some(ObjectRole::HardpointCoverMedium),
            "hardpointcoverlarge" => Some(ObjectRole::HardpointCoverLarge),
            "missile" => Some(ObjectRole::Missile),
            "asteroid" => Some(ObjectRole::Asteroid),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectRole::Ship => "ship",
            ObjectRole::Turret => "turret",
            ObjectRole::TurretBarrel => "turretbarrel",
            ObjectRole::TurretUnder => "turretunder",
            ObjectRole::TurretCoverSmall => "turretcoversmall",
            ObjectRole::TurretCoverMedium => "turretcovermedium",
            ObjectRole::TurretCoverLarge => "turretcoverlarge",
            ObjectRole::Hardpoint => "hardpoint",
            ObjectRole::HardpointBarrel => "hardpointbarrel",
            ObjectRole::HardpointUnder => "hardpointunder",
            ObjectRole::HardpointCoverSmall => "hardpointcoversmall",
            ObjectRole::HardpointCoverMedium => "hardpointcovermedium",
            ObjectRole::HardpointCoverLarge => "hardpointcoverlarge",
            ObjectRole::Missile => "missile",
            ObjectRole::Asteroid => "asteroid",
        }
    }
}

impl fmt::Display for ObjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic identity of a requested texture. Two keys are the same cache slot
/// iff all fields match after canonicalization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub owner: String,
    pub role: ObjectRole,
    pub frame: u32,
}

impl AssetKey {
    pub fn new(owner: impl Into<String>, role: ObjectRole, frame: u32) -> Self {
        Self {
            owner: owner.into(),
            role,
            frame,
        }
        .canonical()
    }

    /// Zeroes the frame for roles that have no animation frames, so that
    /// `("foo", Ship, 3)` and `("foo", Ship, 0)` hit the same slot.
    pub fn canonical(mut self) -> Self {
        if !self.role.animated() {
            self.frame = 0;
        }
        self
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.role.animated() {
            write!(f, "{}${}#{}", self.owner, self.role, self.frame)
        } else {
            write!(f, "{}${}", self.owner, self.role)
        }
    }
}

/// Derives the sprite path for a specific animation frame from the frame-0
/// path, by substituting the two digits before the first extension dot
/// (`gun00.png` -> `gun07.png`). Paths without a two-character substitution
/// window before the dot are returned unchanged.
pub fn anim_frame_path(frame0: &str, frame: u32) -> String {
    if frame == 0 {
        return frame0.to_string();
    }
    let Some(dot) = frame0.find('.') else {
        return frame0.to_string();
    };
    if dot < 2 || !frame0.is_char_boundary(dot - 2) {
        return frame0.to_string();
    }
    format!("{}{:02}{}", &frame0[..dot - 2], frame, &frame0[dot..])
}

/// Deterministic file name for a generated normal map. Every character of the
/// owner id that is not alphanumeric is escaped so that owner ids containing
/// separators or quoting cannot walk out of the cache directory.
pub fn cache_file_name(key: &AssetKey) -> String {
    let escaped: String = key
        .owner
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if key.role.animated() {
        format!("{}___{}{}_normal.png", escaped, key.role, key.frame)
    } else {
        format!("{}___{}_normal.png", escaped, key.role)
    }
}
