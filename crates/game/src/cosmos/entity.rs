use glam::Vec2;
use rkyv::{Archive, Deserialize, Serialize};

use super::components::{
    Crosshair, Driver, Gun, Missile, Movement, RigidBody, Seat, Sentience, Transform,
};
use super::id::{EntityId, EntityType};
use super::pool::Pool;
use super::Cosmos;

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Character {
    pub transform: Transform,
    pub body: RigidBody,
    pub movement: Movement,
    pub crosshair: Crosshair,
    pub sentience: Sentience,
    pub driver: Driver,
    pub gun: Gun,
}

impl Character {
    pub fn at(position: Vec2) -> Self {
        Self {
            transform: Transform::at(position),
            body: RigidBody::default(),
            movement: Movement::default(),
            crosshair: Crosshair::default(),
            sentience: Sentience::default(),
            driver: Driver::default(),
            gun: Gun::default(),
        }
    }

    pub fn is_driving(&self) -> bool {
        self.driver.owned_vehicle.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Vehicle {
    pub transform: Transform,
    pub body: RigidBody,
    pub movement: Movement,
    pub seat: Seat,
}

impl Vehicle {
    pub fn at(position: Vec2) -> Self {
        Self {
            transform: Transform::at(position),
            body: RigidBody {
                mass: 8.0,
                linear_damping: 1.5,
                radius: 40.0,
                ..RigidBody::default()
            },
            movement: Movement::with_limits(1200.0, 700.0),
            seat: Seat::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Projectile {
    pub transform: Transform,
    pub body: RigidBody,
    pub missile: Missile,
}

impl Projectile {
    pub fn fired(
        sender: EntityId,
        position: Vec2,
        direction: Vec2,
        speed: f32,
        damage: f32,
        lifetime_steps: u32,
    ) -> Self {
        Self {
            transform: Transform {
                position,
                facing: direction,
            },
            body: RigidBody {
                velocity: direction * speed,
                mass: 0.05,
                linear_damping: 0.0,
                radius: 4.0,
            },
            missile: Missile {
                sender,
                damage,
                remaining_steps: lifetime_steps,
            },
        }
    }
}

/// Ties an aggregate type to its [`EntityType`] and its pool in the cosmos.
pub trait EntityKind: Sized + Clone + PartialEq {
    const KIND: EntityType;

    fn pool(cosmos: &Cosmos) -> &Pool<Self>;
    fn pool_mut(cosmos: &mut Cosmos) -> &mut Pool<Self>;
    fn entity_ref(&self) -> EntityRef<'_>;
    fn entity_mut(&mut self) -> EntityMut<'_>;
}

impl EntityKind for Character {
    const KIND: EntityType = EntityType::Character;

    fn pool(cosmos: &Cosmos) -> &Pool<Self> {
        &cosmos.characters
    }

    fn pool_mut(cosmos: &mut Cosmos) -> &mut Pool<Self> {
        &mut cosmos.characters
    }

    fn entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Character(self)
    }

    fn entity_mut(&mut self) -> EntityMut<'_> {
        EntityMut::Character(self)
    }
}

impl EntityKind for Vehicle {
    const KIND: EntityType = EntityType::Vehicle;

    fn pool(cosmos: &Cosmos) -> &Pool<Self> {
        &cosmos.vehicles
    }

    fn pool_mut(cosmos: &mut Cosmos) -> &mut Pool<Self> {
        &mut cosmos.vehicles
    }

    fn entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Vehicle(self)
    }

    fn entity_mut(&mut self) -> EntityMut<'_> {
        EntityMut::Vehicle(self)
    }
}

impl EntityKind for Projectile {
    const KIND: EntityType = EntityType::Projectile;

    fn pool(cosmos: &Cosmos) -> &Pool<Self> {
        &cosmos.projectiles
    }

    fn pool_mut(cosmos: &mut Cosmos) -> &mut Pool<Self> {
        &mut cosmos.projectiles
    }

    fn entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Projectile(self)
    }

    fn entity_mut(&mut self) -> EntityMut<'_> {
        EntityMut::Projectile(self)
    }
}

/// Read handle to any live entity.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Character(&'a Character),
    Vehicle(&'a Vehicle),
    Projectile(&'a Projectile),
}

impl<'a> EntityRef<'a> {
    pub fn kind(&self) -> EntityType {
        match self {
            EntityRef::Character(_) => EntityType::Character,
            EntityRef::Vehicle(_) => EntityType::Vehicle,
            EntityRef::Projectile(_) => EntityType::Projectile,
        }
    }

    pub fn get<C: Component>(self) -> Option<&'a C> {
        C::find(self)
    }

    pub fn has<C: Component>(self) -> bool {
        C::find(self).is_some()
    }
}

/// Write handle to any live entity.
#[derive(Debug)]
pub enum EntityMut<'a> {
    Character(&'a mut Character),
    Vehicle(&'a mut Vehicle),
    Projectile(&'a mut Projectile),
}

impl<'a> EntityMut<'a> {
    pub fn kind(&self) -> EntityType {
        match self {
            EntityMut::Character(_) => EntityType::Character,
            EntityMut::Vehicle(_) => EntityType::Vehicle,
            EntityMut::Projectile(_) => EntityType::Projectile,
        }
    }

    pub fn get_mut<C: Component>(self) -> Option<&'a mut C> {
        C::find_mut(self)
    }
}

/// Component lookup keyed by component type.
///
/// Each component knows which aggregates carry it; handles dispatch through
/// this table instead of per-kind accessor chains.
pub trait Component: Sized {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self>;
    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self>;
}

impl Component for Transform {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        Some(match entity {
            EntityRef::Character(c) => &c.transform,
            EntityRef::Vehicle(v) => &v.transform,
            EntityRef::Projectile(p) => &p.transform,
        })
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        Some(match entity {
            EntityMut::Character(c) => &mut c.transform,
            EntityMut::Vehicle(v) => &mut v.transform,
            EntityMut::Projectile(p) => &mut p.transform,
        })
    }
}

impl Component for RigidBody {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        Some(match entity {
            EntityRef::Character(c) => &c.body,
            EntityRef::Vehicle(v) => &v.body,
            EntityRef::Projectile(p) => &p.body,
        })
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        Some(match entity {
            EntityMut::Character(c) => &mut c.body,
            EntityMut::Vehicle(v) => &mut v.body,
            EntityMut::Projectile(p) => &mut p.body,
        })
    }
}

impl Component for Movement {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        match entity {
            EntityRef::Character(c) => Some(&c.movement),
            EntityRef::Vehicle(v) => Some(&v.movement),
            EntityRef::Projectile(_) => None,
        }
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        match entity {
            EntityMut::Character(c) => Some(&mut c.movement),
            EntityMut::Vehicle(v) => Some(&mut v.movement),
            EntityMut::Projectile(_) => None,
        }
    }
}

impl Component for Crosshair {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        match entity {
            EntityRef::Character(c) => Some(&c.crosshair),
            _ => None,
        }
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        match entity {
            EntityMut::Character(c) => Some(&mut c.crosshair),
            _ => None,
        }
    }
}

impl Component for Sentience {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        match entity {
            EntityRef::Character(c) => Some(&c.sentience),
            _ => None,
        }
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        match entity {
            EntityMut::Character(c) => Some(&mut c.sentience),
            _ => None,
        }
    }
}

impl Component for Driver {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        match entity {
            EntityRef::Character(c) => Some(&c.driver),
            _ => None,
        }
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        match entity {
            EntityMut::Character(c) => Some(&mut c.driver),
            _ => None,
        }
    }
}

impl Component for Gun {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        match entity {
            EntityRef::Character(c) => Some(&c.gun),
            _ => None,
        }
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        match entity {
            EntityMut::Character(c) => Some(&mut c.gun),
            _ => None,
        }
    }
}

impl Component for Seat {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        match entity {
            EntityRef::Vehicle(v) => Some(&v.seat),
            _ => None,
        }
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        match entity {
            EntityMut::Vehicle(v) => Some(&mut v.seat),
            _ => None,
        }
    }
}

impl Component for Missile {
    fn find<'a>(entity: EntityRef<'a>) -> Option<&'a Self> {
        match entity {
            EntityRef::Projectile(p) => Some(&p.missile),
            _ => None,
        }
    }

    fn find_mut<'a>(entity: EntityMut<'a>) -> Option<&'a mut Self> {
        match entity {
            EntityMut::Projectile(p) => Some(&mut p.missile),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_resolve_per_kind() {
        let character = Character::at(Vec2::new(1.0, 2.0));
        let vehicle = Vehicle::at(Vec2::ZERO);

        let handle = character.entity_ref();
        assert_eq!(handle.get::<Transform>().unwrap().position, Vec2::new(1.0, 2.0));
        assert!(handle.has::<Gun>());
        assert!(!handle.has::<Seat>());

        let handle = vehicle.entity_ref();
        assert!(handle.has::<Seat>());
        assert!(handle.get::<Sentience>().is_none());
    }

    #[test]
    fn mutable_lookup_writes_through() {
        let mut vehicle = Vehicle::at(Vec2::ZERO);
        if let Some(body) = vehicle.entity_mut().get_mut::<RigidBody>() {
            body.velocity = Vec2::X;
        }
        assert_eq!(vehicle.body.velocity, Vec2::X);
    }
}
