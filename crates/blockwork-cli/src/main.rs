use anyhow::{Context, Result};
use blockwork_config::{BlockEntry, PageConfig};
use blockwork_engine::{
    BlockConfig, BlockDefaults, EventBus, FileExtRenderer, Layout, TextTemplateRenderer,
};
use std::{env, process};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <page-config.toml>", args[0]);
        process::exit(1);
    }

    let config = match PageConfig::load_from_path(&args[1]) {
        Ok(Some(config)) => config,
        Ok(None) => {
            eprintln!("Error: page config '{}' not found", args[1]);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let mut layout = build_layout(&config);
    apply_page(&mut layout, config);

    let page = layout
        .render()
        .with_context(|| format!("failed to render page from '{}'", args[1]))?;
    println!("{page}");

    Ok(())
}

/// Wire up a layout with the standard renderer stack: a text template
/// engine behind the `html` and `txt` extensions.
fn build_layout(config: &PageConfig) -> Layout {
    let mut renderer = FileExtRenderer::new();
    renderer.register(
        "html",
        Box::new(TextTemplateRenderer::new(&config.templates_path)),
    );
    renderer.register(
        "txt",
        Box::new(TextTemplateRenderer::new(&config.templates_path)),
    );

    let mut layout = Layout::new(Box::new(renderer));
    layout.attach_bus(EventBus::new());
    layout
}

/// Transfer a page config onto a layout: metadata, defaults, then each
/// block declaration with its displayed sub-blocks.
fn apply_page(layout: &mut Layout, config: PageConfig) {
    layout.id = config.id;
    layout.description = config.description;
    layout.set_root(config.root);
    layout.enable_debug(config.debug);
    layout.set_default_options(BlockDefaults {
        options: config.defaults.options,
        meta: config.defaults.meta,
    });

    for (id, entry) in config.blocks {
        log::debug!("configuring block '{id}'");
        let children: Vec<(String, bool)> = entry
            .children
            .iter()
            .map(|child| (child.id().to_string(), child.shown()))
            .collect();
        layout.set(&id, to_block_config(entry));
        let block = layout.get_or_create(&id);
        for (child_id, shown) in children {
            block.register_displayed_block(child_id, shown);
        }
    }
}

fn to_block_config(entry: BlockEntry) -> BlockConfig {
    BlockConfig {
        body: entry.body,
        template: entry.template,
        options: entry.options,
        data: entry.data,
        meta: entry.meta,
        assets: entry.assets,
        requires: entry.requires,
        first_assets: entry.first_assets,
        inline: entry
            .inline
            .into_iter()
            .map(|(target, items)| {
                (
                    target,
                    items
                        .into_iter()
                        .map(|item| blockwork_engine::InlineAsset {
                            kind: item.kind,
                            content: item.content,
                        })
                        .collect(),
                )
            })
            .collect(),
    }
}
