use std::ops::{Index, IndexMut};

/// Number of controlled degrees of freedom
pub const DOF: usize = 6;

/// Controlled axes, in the column order of the orientation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Dof{
    /// Forward (surge)
    F = 0,
    /// Lateral (sway)
    H = 1,
    /// Vertical (heave)
    V = 2,
    Y = 3,
    P = 4,
    R = 5,
}

impl Dof{
    pub const ALL: [Dof; DOF] = [Dof::F, Dof::H, Dof::V, Dof::Y, Dof::P, Dof::R];
}

/// One value per degree of freedom, indexed by [`Dof`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DofVector(pub [f32; DOF]);

impl DofVector{
    pub const ZERO: DofVector = DofVector([0.0; DOF]);

    pub fn scaled(&self, k: f32) -> DofVector{
        let mut out = *self;
        for v in out.0.iter_mut(){
            *v *= k;
        }
        out
    }
}

impl Index<Dof> for DofVector{
    type Output = f32;

    fn index(&self, dof: Dof) -> &f32{
        &self.0[dof as usize]
    }
}

impl IndexMut<Dof> for DofVector{
    fn index_mut(&mut self, dof: Dof) -> &mut f32{
        &mut self.0[dof as usize]
    }
}

/// Heading, pitch and roll in degrees, as reported by the AHRS.
/// Yaw clockwise from north, pitch positive nose up, roll positive
/// starboard down.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude{
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Which sensor the vertical axis regulates against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerticalMode{
    #[default]
    Depth,
    /// Height above the bottom from the DVL range
    Altitude,
}

/// Vehicle pose. Used both for where the sub thinks it is and where it
/// wants to be.
///
/// x = north, y = east (m, from the estimator), z = depth (m, down positive)
/// or altitude when the setpoint selects [`VerticalMode::Altitude`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct State{
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub vertical: VerticalMode,
}

impl State{
    pub fn attitude(&self) -> Attitude{
        Attitude{ yaw: self.yaw, pitch: self.pitch, roll: self.roll }
    }
}

/// Wrap an angle in degrees into (-180, 180].
pub fn wrap_degrees(angle: f32) -> f32{
    let mut a = angle % 360.0;
    if a > 180.0{
        a -= 360.0;
    }else if a <= -180.0{
        a += 360.0;
    }
    a
}
