#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_test::traced_test;

    use crate::config::RenderConfig;
    use crate::error::SsrError;
    use crate::rendering::{render_async, render_to_string, render_to_string_async};
    use crate::resource::create_resource;
    use crate::resource::lazy::{Lazy, lazy};
    use crate::suspense::suspense;

    async fn delayed(value: &str, ms: u64) -> Result<String, String> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(value.to_string())
    }

    /// Reads a resource loaded after `ms` milliseconds.
    fn slow_text(value: &'static str, ms: u64) -> String {
        let resource = create_resource::<String>(None);
        resource.load(move || delayed(value, ms));
        resource.read().unwrap_or_default()
    }

    fn config_with_timeout(ms: u64) -> RenderConfig {
        RenderConfig::default().with_timeout(Duration::from_millis(ms))
    }

    #[tokio::test]
    async fn test_immediate_resource_never_suspends() {
        let render = render_async(
            || {
                suspense("loading", || {
                    let resource = create_resource::<String>(None);
                    resource.load(|| async { Ok::<_, String>("X".to_string()) });
                    resource.read().unwrap_or_default()
                })
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(render.html, "X");
        assert_eq!(render.resources.get("0.0.0"), Some(&serde_json::json!("X")));
    }

    #[tokio::test]
    async fn test_single_boundary_placeholder_is_substituted() {
        let shell = Arc::new(Mutex::new(String::new()));
        let captured = Arc::clone(&shell);

        let render = render_async(
            move || {
                let html = suspense("loading", || slow_text("X", 10));
                captured.lock().clone_from(&html);
                html
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(*shell.lock(), "<#0.0#>");
        assert_eq!(render.html, "X");
        assert_eq!(
            render.hydration_script(None).unwrap(),
            "<script>_$HY.set(\"0.0.0\", \"X\");</script>"
        );
    }

    #[tokio::test]
    async fn test_sibling_boundaries_resolved_in_reverse_order_keep_positions() {
        let shell = Arc::new(Mutex::new(String::new()));
        let captured = Arc::clone(&shell);

        let html = render_to_string_async(
            move || {
                let html = format!(
                    "<div>{}|{}</div>",
                    suspense("a…", || slow_text("A", 40)),
                    suspense("b…", || slow_text("B", 5)),
                );
                captured.lock().clone_from(&html);
                html
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(*shell.lock(), "<div><#0.0#>|<#0.1#></div>");
        assert_eq!(html, "<div>A|B</div>");
    }

    #[tokio::test]
    async fn test_nested_boundaries_substitute_transitively() {
        let html = render_to_string_async(
            || {
                suspense("outer…", || {
                    let own = slow_text("A", 5);
                    format!("{own}[{}]", suspense("inner…", || slow_text("B", 30)))
                })
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(html, "A[B]");
    }

    #[tokio::test]
    async fn test_inner_boundary_resolving_first() {
        let html = render_to_string_async(
            || {
                suspense("outer…", || {
                    let own = slow_text("A", 30);
                    format!("{own}[{}]", suspense("inner…", || slow_text("B", 5)))
                })
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(html, "A[B]");
    }

    #[tokio::test]
    async fn test_boundary_waits_for_every_resource() {
        let render = render_async(
            || {
                suspense("loading", || {
                    let a = slow_text("a", 5);
                    let b = slow_text("b", 15);
                    let c = slow_text("c", 10);
                    format!("{a}{b}{c}")
                })
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(render.html, "abc");
        assert_eq!(render.resources.len(), 3);
    }

    #[tokio::test]
    async fn test_resource_loaded_by_parent_and_read_inside_boundary() {
        let html = render_to_string_async(
            || {
                let resource = create_resource::<String>(None);
                resource.load(|| delayed("X", 5));
                let inner = suspense("…", move || resource.read().unwrap_or_default());
                format!("<p>{inner}</p>")
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(html, "<p>X</p>");
    }

    #[tokio::test]
    async fn test_lazy_outside_boundary_loads_for_later_renders() {
        let component: Lazy<String> = lazy(|| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, String>(|name: String| format!("<h1>{name}</h1>"))
        });

        let slot = component.clone();
        let first = render_to_string_async(move || slot.render("a".to_string()), &RenderConfig::default())
            .await
            .unwrap();
        assert_eq!(first, "");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(component.is_loaded());

        let slot = component.clone();
        let second = render_to_string_async(move || slot.render("b".to_string()), &RenderConfig::default())
            .await
            .unwrap();
        assert_eq!(second, "<h1>b</h1>");
    }

    #[tokio::test]
    async fn test_lazy_component_renders_after_load() {
        let component: Lazy<String> = lazy(|| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, String>(|name: String| format!("<h1>{name}</h1>"))
        });
        let slot = component.clone();

        let html = render_to_string_async(
            move || suspense("…", move || slot.render("lazy".to_string())),
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(html, "<h1>lazy</h1>");
        assert!(component.is_loaded());
    }

    #[tokio::test]
    async fn test_render_id_prefixes_every_id() {
        let config = RenderConfig::default().with_render_id("3.");
        let render = render_async(|| suspense("…", || slow_text("X", 1)), &config).await.unwrap();

        assert_eq!(render.html, "X");
        assert!(render.resources.contains_key("3.0.0.0"));
    }

    #[tokio::test]
    async fn test_no_boundary_returns_markup_unscanned() {
        let html = render_to_string_async(
            || "<p>literal <#1.2#> token</p>".to_string(),
            &RenderConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(html, "<p>literal <#1.2#> token</p>");
    }

    #[tokio::test]
    async fn test_stray_token_next_to_suspended_boundary_is_rejected() {
        let err = render_to_string_async(
            || format!("<#9.9#>{}", suspense("…", || slow_text("X", 1))),
            &RenderConfig::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, SsrError::UnresolvedFragment("9.9".to_string()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_timeout_reports_pending_boundaries() {
        let err = render_to_string_async(
            || {
                suspense("…", || {
                    let resource = create_resource::<String>(None);
                    resource.load(|| futures::future::pending::<Result<String, String>>());
                    resource.read().unwrap_or_default()
                })
            },
            &config_with_timeout(30),
        )
        .await
        .unwrap_err();

        assert_eq!(err, SsrError::Timeout { timeout_ms: 30, pending: vec!["0.0".to_string()] });
        assert!(logs_contain("Render timed out"));
    }

    #[tokio::test]
    async fn test_read_without_load_stalls_immediately() {
        let err = render_to_string_async(
            || {
                suspense("…", || {
                    create_resource::<String>(Some("initial".to_string()))
                        .read()
                        .unwrap_or_default()
                })
            },
            &config_with_timeout(60_000),
        )
        .await
        .unwrap_err();

        assert_eq!(err, SsrError::Stalled { pending: vec!["0.0".to_string()], cause: None });
    }

    #[tokio::test]
    async fn test_rejected_producer_stalls_with_cause() {
        let err = render_to_string_async(
            || {
                suspense("…", || {
                    let resource = create_resource::<String>(None);
                    resource.load(|| async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Err::<String, _>("backend unavailable")
                    });
                    resource.read().unwrap_or_default()
                })
            },
            &RenderConfig::default(),
        )
        .await
        .unwrap_err();

        match err {
            SsrError::Stalled { pending, cause } => {
                assert_eq!(pending, ["0.0"]);
                assert_eq!(
                    cause.map(|c| *c),
                    Some(SsrError::producer("0.0.0", "backend unavailable"))
                );
            }
            other => panic!("Expected Stalled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_rendering() {
        let config = RenderConfig { timeout_ms: 0, ..RenderConfig::default() };
        let err = render_to_string_async(String::new, &config).await.unwrap_err();

        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_sync_render_shows_fallbacks() {
        let html = render_to_string(|| {
            format!("<main>{}</main>", suspense("<i>loading</i>", || slow_text("X", 1)))
        });

        assert_eq!(html, "<main><i>loading</i></main>");
    }
}
