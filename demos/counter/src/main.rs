use crispy_core::prelude::*;
use crispy_devtools::Inspector;

fn app_state() -> Value {
    Value::map([
        ("counter", Value::map([("value", Value::from(0)), ("step", Value::from(1))])),
        ("user", Value::map([("name", Value::from("guest")), ("avatar", Value::Null)])),
    ])
}

fn counter_label(ctx: &StoreContext, value: &TypedPath<i64>) -> Consumer {
    let (ctx, value) = (ctx.clone(), value.clone());
    Consumer::mount_with(ConsumerOptions::default().label("counter_label"), move || {
        match ctx.use_store_state(&value) {
            Ok(v) => println!("Count: {v}"),
            Err(e) => log::error!("counter_label: {e}"),
        }
    })
}

fn greeting(ctx: &StoreContext) -> Consumer {
    let ctx = ctx.clone();
    Consumer::mount_with(ConsumerOptions::default().label("greeting"), move || {
        if let Ok(Some(name)) = ctx.use_store_state("user.name") {
            println!("Hello, {}!", name.as_str().unwrap_or("?"));
        }
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let ctx = StoreContext::with_options(
        app_state(),
        StoreOptions::default().label("counter-app").validate_paths(true),
    );
    let value: TypedPath<i64> = ctx.path("counter.value")?;
    let step: TypedPath<i64> = ctx.path("counter.step")?;

    let scope = ctx.create_scope();
    let mut inspector = Inspector::attach(scope.store());

    scope.enter(|| -> anyhow::Result<()> {
        let label = counter_label(&ctx, &value);
        let hello = greeting(&ctx);

        let increment = ctx.use_store_updater(&value)?;
        let step_by = ctx.store()?.get(step.path()).and_then(|v| v.as_i64()).unwrap_or(1);
        for _ in 0..3 {
            increment.update(|v| v.and_then(Value::as_i64).unwrap_or(0) + step_by)?;
        }

        ctx.use_store_updater("user.name")?.set("Ada")?;

        // `user.avatar` is null: there is nothing to write `url` into.
        if let Err(e) = ctx.use_store_updater("user.avatar.url")?.set("a.png") {
            println!("rejected: {e}");
        }

        println!(
            "renders: counter_label={}, greeting={}",
            label.render_count(),
            hello.render_count()
        );
        Ok(())
    })?;

    for line in inspector.overlay_lines() {
        println!("{line}");
    }
    inspector.detach();
    scope.dispose();
    Ok(())
}
