//! Snapshot coordinator round-trip: engine, grid, cell map, event
//! scheduler, ability manager, resource registry, and event log together.

use std::rc::Rc;

use tick_engine::prelude::*;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct NeedSet {
    hunger: f64,
    rest: f64,
}

impl Component for NeedSet {
    const NAME: &'static str = "colony.NeedSet";
}

struct Colony {
    engine: Engine,
    scheduler: Rc<EventScheduler>,
    abilities: Rc<AbilityManager>,
    resources: Rc<ResourceRegistry>,
    cellmap: Rc<CellMap>,
    grid: Rc<Grid2D>,
    log: Rc<EventLog>,
    settlers: Vec<EntityId>,
}

/// A small colony with every coordinator-managed registry in play.
fn colony() -> Colony {
    let mut engine = Engine::new(20, Some(42)).unwrap();
    engine.world_mut().register_component::<Pos2D>();
    engine.world_mut().register_component::<NeedSet>();

    let mut settlers = Vec::new();
    for (x, y) in [(1.0, 2.0), (4.0, 4.0)] {
        let e = engine.world_mut().spawn();
        engine.world_mut().attach(e, Pos2D { x, y }).unwrap();
        engine
            .world_mut()
            .attach(
                e,
                NeedSet {
                    hunger: 0.3,
                    rest: 0.8,
                },
            )
            .unwrap();
        settlers.push(e);
    }

    let grass = CellDef::new("grass").unwrap();
    let forest = CellDef::new("forest").unwrap().with_move_cost(2.0).unwrap();
    let cellmap = CellMap::new(grass);
    cellmap.set(&[3, 3], &forest).unwrap();

    let scheduler = EventScheduler::new();
    scheduler.define(EventDef::new("festival", TickDuration::Fixed(6)));

    let abilities = AbilityManager::new();
    abilities.define(AbilityDef::new("rally", TickDuration::Fixed(1)).with_cooldown(8));

    let resources = ResourceRegistry::new();
    resources
        .define(ResourceDef::new("wheat").with_decay_rate(0))
        .unwrap();

    let grid = Grid2D::new(8, 8).unwrap();
    grid.rebuild(engine.world());

    let log = EventLog::new();
    log.emit(0, "founded", serde_json::json!({"settlers": 2}));

    let guards = EventGuards::new();
    engine.add_boxed_system(
        "events",
        event_system(Rc::clone(&scheduler), guards, EventHooks::default()),
    );
    let mgr = Rc::clone(&abilities);
    engine.add_system("invoke_rally", move |world, ctx| {
        if ctx.tick_number == 1 {
            mgr.invoke("rally", world, ctx, None)?;
        }
        Ok(())
    });
    engine.add_boxed_system(
        "abilities",
        ability_system(Rc::clone(&abilities), AbilityHooks::default()),
    );

    Colony {
        engine,
        scheduler,
        abilities,
        resources,
        cellmap,
        grid,
        log,
        settlers,
    }
}

fn coordinator(colony: &Colony) -> SnapshotCoordinator {
    SnapshotCoordinator::new()
        .with_grid(Rc::clone(&colony.grid) as Rc<dyn SpatialIndex>)
        .with_event_log(Rc::clone(&colony.log))
        .with_scheduler(Rc::clone(&colony.scheduler))
        .with_cellmap(Rc::clone(&colony.cellmap))
        .with_abilities(Rc::clone(&colony.abilities))
        .with_resources(Rc::clone(&colony.resources))
}

#[test]
fn full_colony_state_round_trips() {
    let mut source = colony();
    // Run until rally has ended and is cooling down, festival still active.
    source.engine.run(3).unwrap();
    assert!(source.scheduler.is_active("festival"));
    assert!(source.abilities.cooldown_remaining("rally") > 0);

    let tree = coordinator(&source).snapshot(&source.engine).unwrap();

    // A fresh colony with matching registrations but empty runtime state.
    let mut target = colony();
    // Divergent state that must be overwritten by the restore.
    target.cellmap.set(&[0, 0], &CellDef::new("forest").unwrap().with_move_cost(2.0).unwrap()).unwrap();
    coordinator(&target).restore(&mut target.engine, &tree).unwrap();

    // Engine identity.
    assert_eq!(
        target.engine.clock().tick_number(),
        source.engine.clock().tick_number()
    );
    assert_eq!(target.engine.seed(), source.engine.seed());
    assert_eq!(
        target.engine.world().entities(),
        source.engine.world().entities()
    );
    for &settler in &source.settlers {
        assert_eq!(
            target.engine.world().get::<Pos2D>(settler).unwrap(),
            source.engine.world().get::<Pos2D>(settler).unwrap()
        );
        assert_eq!(
            target.engine.world().get::<NeedSet>(settler).unwrap(),
            source.engine.world().get::<NeedSet>(settler).unwrap()
        );
    }

    // Cell map contents.
    assert_eq!(target.cellmap.at(&[3, 3]).name, "forest");
    assert_eq!(target.cellmap.at(&[0, 0]).name, "grass");

    // Event scheduler runtime state.
    assert_eq!(
        target.scheduler.time_remaining("festival"),
        source.scheduler.time_remaining("festival")
    );

    // Ability cooldown.
    assert_eq!(
        target.abilities.cooldown_remaining("rally"),
        source.abilities.cooldown_remaining("rally")
    );
    assert_eq!(target.abilities.state("rally"), source.abilities.state("rally"));

    // Resource registry and event log.
    assert!(target.resources.has("wheat"));
    assert_eq!(target.log.query(None, None), source.log.query(None, None));

    // Spatial index rebuilt from restored positions.
    assert_eq!(target.grid.position_of(source.settlers[0]), Some((1, 2)));
    assert_eq!(target.grid.position_of(source.settlers[1]), Some((4, 4)));
}

#[test]
fn restored_colony_continues_identically() -> anyhow::Result<()> {
    let mut source = colony();
    source.engine.run(2)?;
    let tree = coordinator(&source).snapshot(&source.engine)?;

    source.engine.run(4)?;
    let source_hash = source.engine.state_hash()?;

    let mut target = colony();
    coordinator(&target).restore(&mut target.engine, &tree)?;
    target.engine.run(4)?;

    assert_eq!(target.engine.state_hash()?, source_hash);
    assert_eq!(
        target.abilities.state("rally"),
        source.abilities.state("rally")
    );
    assert_eq!(
        target.scheduler.time_remaining("festival"),
        source.scheduler.time_remaining("festival")
    );
    Ok(())
}

#[test]
fn unknown_sibling_keys_are_ignored() {
    let source = colony();
    let mut tree = coordinator(&source).snapshot(&source.engine).unwrap();
    tree["colony"]["weather_cache"] = serde_json::json!({"clouds": 3});
    tree["debug"] = serde_json::json!(true);

    let mut target = colony();
    coordinator(&target).restore(&mut target.engine, &tree).unwrap();
    assert_eq!(target.engine.clock().tick_number(), 0);
}
