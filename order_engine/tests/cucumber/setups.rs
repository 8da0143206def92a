use cucumber::given;

use crate::cucumber::{world::OrderEngineSystem, OrderWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut OrderWorld) {
    let system = OrderEngineSystem::new().await;
    world.system = Some(system);
}
