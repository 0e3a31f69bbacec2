use super::*;
use log::Level;

const URL: &str = "https://example.test/book.html";
const CHAPTERS: [&str; 3] = ["book1-1", "book1-2", "book2-1"];

const BOOK_HTML: &str = r#"
    <nav id='toc'>
      <a id='tocLink' href='#book2-1'>Book 2.1</a>
      <a id='randomChapterLink' href='#'><span id='dice'>*</span> Random chapter</a>
    </nav>
    <p id='intro'>Introduction, outside the book.</p>
    <div id='bookContainer'>
      <article id='book1'>
        <h2 id='book1-title'>Book One</h2>
        <section id='book1-1'><p id='b11p'>First chapter</p></section>
        <section id='book1-2'>Second chapter</section>
      </article>
      <article id='book2'>
        <section id='book2-1'>Third chapter</section>
      </article>
      <p id='colophon'>Set in a serif face.</p>
    </div>
"#;

fn page_at(html: &str, fragment: &str) -> Result<Page> {
    Page::from_html_with_url(&format!("{URL}{fragment}"), html)
}

fn chapters_only() -> Result<FocusConfig> {
    Ok(FocusConfig::default().with_eligibility(Eligibility::chapter("book")?))
}

fn current_chapter(page: &Page) -> String {
    page.location_hash().trim_start_matches('#').to_string()
}

fn warnings(page: &mut Page) -> Vec<String> {
    page.take_diagnostics()
        .into_iter()
        .filter(|d| d.level <= Level::Warn)
        .map(|d| d.message)
        .collect()
}

#[test]
fn literal_fragment_at_load_marks_chapter_and_scrolls_after_delay() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book1-2")?;
    page.attach(FocusConfig::default())?;

    page.assert_marked("#bookContainer", Some("#book1-2"))?;
    assert_eq!(page.ids_with_class("ancestor-visible"), vec!["book1"]);
    assert!(warnings(&mut page).is_empty());

    page.advance_time(49)?;
    assert!(page.scroll_log().is_empty());
    page.advance_time(1)?;
    let scrolls = page.scroll_log();
    assert_eq!(scrolls.len(), 1);
    assert_eq!(scrolls[0].target_id.as_deref(), Some("book1-2"));
    assert_eq!(scrolls[0].at_ms, 50);
    assert_eq!(scrolls[0].behavior, ScrollBehavior::Smooth);
    assert_eq!(scrolls[0].block, ScrollBlock::Start);
    Ok(())
}

#[test]
fn deep_target_marks_every_ancestor_but_not_the_container() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#b11p")?;
    page.attach(FocusConfig::default())?;

    page.assert_marked("#bookContainer", Some("#b11p"))?;
    assert_eq!(page.ids_with_class("visible-section"), vec!["b11p"]);
    assert_eq!(
        page.ids_with_class("ancestor-visible"),
        vec!["book1", "book1-1"]
    );
    page.assert_class("#bookContainer", "fade-active", true)?;
    page.assert_class("#bookContainer", "ancestor-visible", false)?;
    Ok(())
}

#[test]
fn container_self_target_is_rejected_with_warning() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#bookContainer")?;
    page.attach(FocusConfig::default())?;

    page.assert_marked("#bookContainer", None)?;
    let warnings = warnings(&mut page);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("container itself"), "{warnings:?}");
    Ok(())
}

#[test]
fn hashchange_moves_focus_and_keeps_one_target() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "")?;
    let id = page.attach(FocusConfig::default())?.expect("container exists");
    assert_eq!(page.focus_state(id), Some(FocusState::NoTarget));

    page.navigate_fragment("book1-1")?;
    page.assert_marked("#bookContainer", Some("#book1-1"))?;
    page.navigate_fragment("book2-1")?;
    page.assert_marked("#bookContainer", Some("#book2-1"))?;
    assert_eq!(page.ids_with_class("visible-section"), vec!["book2-1"]);
    assert_eq!(page.ids_with_class("ancestor-visible"), vec!["book2"]);

    let book2_1 = page.dom().by_id("book2-1").expect("fixture has book2-1");
    assert_eq!(page.focus_state(id), Some(FocusState::Target(book2_1)));

    page.navigate_fragment("")?;
    page.assert_marked("#bookContainer", None)?;
    assert_eq!(page.focus_state(id), Some(FocusState::NoTarget));
    Ok(())
}

#[test]
fn unknown_and_outside_targets_clear_quietly() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book1-1")?;
    page.attach(FocusConfig::default())?;

    page.navigate_fragment("nowhere")?;
    page.assert_marked("#bookContainer", None)?;
    page.navigate_fragment("intro")?;
    page.assert_marked("#bookContainer", None)?;
    assert!(warnings(&mut page).is_empty());
    Ok(())
}

#[test]
fn replace_fragment_is_not_observed() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book1-1")?;
    page.attach(FocusConfig::default())?;

    page.replace_fragment("book1-2")?;
    assert_eq!(page.location_hash(), "#book1-2");
    assert_eq!(page.history_len(), 1);
    page.assert_marked("#bookContainer", Some("#book1-1"))?;
    Ok(())
}

#[test]
fn random_fragment_at_load_is_rewritten_in_place() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#random")?;
    page.set_random_seed(7);
    page.attach(chapters_only()?)?;

    // Deferred to a zero-delay timer.
    assert_eq!(page.location_hash(), "#random");
    page.assert_marked("#bookContainer", None)?;

    assert_eq!(page.run_due_timers()?, 1);
    let chosen = current_chapter(&page);
    assert!(CHAPTERS.contains(&chosen.as_str()), "picked {chosen}");
    page.assert_marked("#bookContainer", Some(format!("#{chosen}").as_str()))?;
    assert_eq!(page.history_len(), 1);
    assert_eq!(page.location_href(), format!("{URL}#{chosen}"));
    Ok(())
}

#[test]
fn startup_delay_defers_random_resolution() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#random")?;
    page.attach(chapters_only()?.with_startup_delay_ms(30))?;

    let pending = page.pending_timers();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].due_at, 30);
    assert_eq!(pending[0].label, "startup-resolve(controller=0)");

    page.advance_time(29)?;
    assert_eq!(page.location_hash(), "#random");
    page.advance_time(1)?;
    assert!(CHAPTERS.contains(&current_chapter(&page).as_str()));

    let pending = page.pending_timers();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].due_at, 80);
    Ok(())
}

#[test]
fn navigating_to_random_replaces_the_pushed_entry() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "")?;
    page.set_random_seed(99);
    page.attach(chapters_only()?)?;

    page.navigate_fragment("random")?;
    assert_eq!(page.history_len(), 2);
    assert_eq!(page.history_index(), 1);
    let chosen = current_chapter(&page);
    assert!(CHAPTERS.contains(&chosen.as_str()), "picked {chosen}");
    assert_eq!(page.ids_with_class("visible-section"), vec![chosen]);

    page.history_back()?;
    assert_eq!(page.location_href(), URL);
    page.assert_marked("#bookContainer", None)?;
    Ok(())
}

#[test]
fn random_alias_tokens_resolve_like_random() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "")?;
    page.attach(chapters_only()?.with_random_tokens(["random", "random-book"]))?;

    page.navigate_fragment("random-book")?;
    let chosen = current_chapter(&page);
    assert!(CHAPTERS.contains(&chosen.as_str()), "picked {chosen}");
    assert_eq!(page.ids_with_class("visible-section"), vec![chosen]);
    Ok(())
}

#[test]
fn random_with_no_sections_clears_fragment_and_notifies() -> Result<()> {
    let html = r#"
        <a id='randomChapterLink' href='#'>Random</a>
        <div id='bookContainer'><p>Prose without chapters.</p></div>
    "#;
    let mut page = page_at(html, "#random")?;
    page.attach(FocusConfig::default())?;
    page.run_due_timers()?;

    assert_eq!(page.location_hash(), "");
    assert_eq!(page.location_href(), URL);
    assert_eq!(page.history_len(), 1);
    assert_eq!(page.take_notices().len(), 1);
    let warnings = warnings(&mut page);
    assert!(
        warnings.iter().any(|w| w.contains("random chapter requested")),
        "{warnings:?}"
    );
    page.assert_marked("#bookContainer", None)?;
    Ok(())
}

#[test]
fn pointer_down_outside_visible_region_clears_focus() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book1-1")?;
    let id = page.attach(FocusConfig::default())?.expect("container exists");

    // Inside the target, inside an ancestor, and on the random control.
    for selector in ["#b11p", "#book1-2", "#book1-title", "#dice"] {
        page.pointer_down(selector)?;
        page.assert_marked("#bookContainer", Some("#book1-1"))?;
    }

    page.pointer_down("#colophon")?;
    page.assert_marked("#bookContainer", None)?;
    assert_eq!(page.focus_state(id), Some(FocusState::NoTarget));
    assert_eq!(page.location_hash(), "#book1-1");
    Ok(())
}

#[test]
fn pointer_down_outside_the_container_clears_focus() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book2-1")?;
    page.attach(FocusConfig::default())?;

    page.pointer_down("#intro")?;
    page.assert_marked("#bookContainer", None)?;
    Ok(())
}

#[test]
fn clearing_before_the_scroll_delay_skips_the_scroll() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book1-1")?;
    page.attach(FocusConfig::default())?;

    page.pointer_down("#intro")?;
    page.flush()?;
    assert!(page.scroll_log().is_empty());
    assert_eq!(page.now_ms(), 50);
    Ok(())
}

#[test]
fn toc_anchor_click_focuses_its_chapter() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "")?;
    page.attach(FocusConfig::default())?;

    page.click("#tocLink")?;
    assert_eq!(page.location_hash(), "#book2-1");
    assert_eq!(page.history_len(), 2);
    page.assert_marked("#bookContainer", Some("#book2-1"))?;
    assert_eq!(page.active_element_id().as_deref(), Some("tocLink"));
    Ok(())
}

const ONE_CHAPTER_HTML: &str = r#"
    <a id='randomChapterLink' href='#'>Random</a>
    <div id='bookContainer'>
      <section id='book1-1'>Only chapter</section>
      <div id='appendix'>Notes</div>
    </div>
"#;

#[test]
fn trigger_click_navigates_and_back_restores_previous_focus() -> Result<()> {
    let mut page = page_at(ONE_CHAPTER_HTML, "#appendix")?;
    page.attach(chapters_only()?)?;
    page.assert_marked("#bookContainer", Some("#appendix"))?;

    page.click("#randomChapterLink")?;
    assert_eq!(page.location_hash(), "#book1-1");
    assert_eq!(page.history_len(), 2);
    page.assert_marked("#bookContainer", Some("#book1-1"))?;
    assert_eq!(page.active_element_id(), None);

    page.history_back()?;
    assert_eq!(page.location_hash(), "#appendix");
    page.assert_marked("#bookContainer", Some("#appendix"))?;

    page.history_forward()?;
    page.assert_marked("#bookContainer", Some("#book1-1"))?;
    Ok(())
}

#[test]
fn trigger_click_on_current_chapter_refocuses_without_history_entry() -> Result<()> {
    let mut page = page_at(ONE_CHAPTER_HTML, "#book1-1")?;
    page.attach(chapters_only()?)?;
    assert_eq!(page.pending_timers().len(), 1);

    page.click("#randomChapterLink")?;
    assert_eq!(page.history_len(), 1);
    page.assert_marked("#bookContainer", Some("#book1-1"))?;
    assert_eq!(page.pending_timers().len(), 2);
    Ok(())
}

#[test]
fn empty_index_disables_random_control() -> Result<()> {
    let html = r#"
        <a id='randomChapterLink' href='#'>Random</a>
        <div id='bookContainer'><p>Prose without chapters.</p></div>
    "#;
    let mut page = page_at(html, "")?;
    page.attach(FocusConfig::default())?;

    assert_eq!(page.attr("#randomChapterLink", "hidden")?, Some(String::new()));
    assert_eq!(
        page.attr("#randomChapterLink", "aria-disabled")?.as_deref(),
        Some("true")
    );
    let warnings = warnings(&mut page);
    assert!(
        warnings.iter().any(|w| w.contains("no chapter sections")),
        "{warnings:?}"
    );

    page.click("#randomChapterLink")?;
    assert_eq!(page.location_href(), URL);
    assert_eq!(page.history_len(), 1);
    assert!(page.take_notices().is_empty());
    page.assert_marked("#bookContainer", None)?;
    Ok(())
}

#[test]
fn missing_container_disables_controller_and_hides_trigger() -> Result<()> {
    let html = "<a id='randomChapterLink' href='#'>Random</a><p id='book1-1'>x</p>";
    let mut page = page_at(html, "#book1-1")?;
    assert_eq!(page.attach(FocusConfig::default())?, None);

    assert_eq!(page.attr("#randomChapterLink", "hidden")?, Some(String::new()));
    let diagnostics = page.take_diagnostics();
    assert!(
        diagnostics
            .iter()
            .any(|d| d.level == Level::Error && d.message.contains("bookContainer")),
        "{diagnostics:?}"
    );
    assert!(page.ids_with_class("visible-section").is_empty());
    Ok(())
}

#[test]
fn missing_trigger_only_warns() -> Result<()> {
    let html = "<div id='bookContainer'><section id='book1-1'>x</section></div>";
    let mut page = page_at(html, "#book1-1")?;
    page.attach(FocusConfig::default())?;

    let warnings = warnings(&mut page);
    assert!(
        warnings.iter().any(|w| w.contains("randomChapterLink")),
        "{warnings:?}"
    );
    page.assert_marked("#bookContainer", Some("#book1-1"))?;
    Ok(())
}

#[test]
fn malformed_fragment_yields_no_markers() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#%E0%A4")?;
    page.attach(FocusConfig::default())?;

    page.assert_marked("#bookContainer", None)?;
    let warnings = warnings(&mut page);
    assert!(warnings.iter().any(|w| w.contains("malformed")), "{warnings:?}");
    Ok(())
}

#[test]
fn percent_encoded_identifiers_resolve() -> Result<()> {
    let html = "<div id='bookContainer'><section id='第1章'>x</section></div>";
    let mut page = page_at(html, "")?;
    page.attach(FocusConfig::default().with_trigger_id(None))?;

    page.navigate_fragment("第1章")?;
    assert_eq!(page.location_hash(), "#%E7%AC%AC1%E7%AB%A0");
    assert_eq!(page.ids_with_class("visible-section"), vec!["第1章"]);
    Ok(())
}

#[test]
fn independent_controllers_share_one_page() -> Result<()> {
    let html = r#"
        <div id='left'><section id='l1'>L1</section><section id='l2'>L2</section></div>
        <div id='right'><section id='r1'>R1</section><section id='r2'>R2</section></div>
    "#;
    let mut page = page_at(html, "#l1")?;
    let left = FocusConfig::default()
        .with_container_id("left")
        .with_trigger_id(None);
    let right = left.clone().with_container_id("right");
    page.attach(left)?;
    let right_id = page.attach(right)?.expect("right container exists");

    page.assert_marked("#left", Some("#l1"))?;
    page.assert_marked("#right", None)?;

    page.navigate_fragment("r1")?;
    page.assert_marked("#left", None)?;
    page.assert_marked("#right", Some("#r1"))?;

    assert!(page.detach(right_id));
    assert!(!page.detach(right_id));
    page.navigate_fragment("r2")?;
    assert_eq!(page.ids_with_class("visible-section"), vec!["r1"]);
    Ok(())
}

#[test]
fn custom_marker_classes_are_used() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book2-1")?;
    page.attach(FocusConfig::default().with_markers(MarkerClasses {
        focus_active: "dimmed".into(),
        directly_visible: "lit".into(),
        ancestor_visible: "lit-path".into(),
    }))?;

    page.assert_class("#bookContainer", "dimmed", true)?;
    page.assert_class("#book2-1", "lit", true)?;
    page.assert_class("#book2", "lit-path", true)?;
    page.assert_class("#book2-1", "visible-section", false)?;
    Ok(())
}

#[test]
fn invalid_config_is_rejected_at_attach() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "")?;
    let err = page
        .attach(FocusConfig::default().with_scroll_delay_ms(-5))
        .expect_err("negative delay must be rejected");
    assert!(matches!(err, Error::InvalidConfig(_)));
    Ok(())
}

#[test]
fn assert_marked_reports_mismatch_with_snippet() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "#book1-1")?;
    page.attach(FocusConfig::default())?;

    match page.assert_marked("#bookContainer", Some("#book1-2")) {
        Err(Error::AssertionFailed {
            expected,
            actual,
            dom_snippet,
            ..
        }) => {
            assert!(expected.contains("section#book1-2"), "{expected}");
            assert!(actual.contains("section#book1-1"), "{actual}");
            assert!(dom_snippet.starts_with("<div id=\"bookContainer\""));
        }
        other => panic!("expected assertion failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn timer_step_limit_guards_flush() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "")?;
    page.attach(FocusConfig::default())?;
    page.navigate_fragment("book1-1")?;
    page.navigate_fragment("book1-2")?;
    assert_eq!(page.pending_timers().len(), 2);

    page.set_timer_step_limit(1)?;
    match page.flush() {
        Err(Error::Runtime(message)) => {
            assert!(message.contains("exceeded max task steps"), "{message}")
        }
        other => panic!("expected step limit error, got {other:?}"),
    }
    assert_eq!(page.clear_all_timers(), 1);
    Ok(())
}

#[test]
fn trace_records_focus_and_event_lines() -> Result<()> {
    let mut page = page_at(BOOK_HTML, "")?;
    page.enable_trace(true);
    page.set_trace_stderr(false);
    page.attach(FocusConfig::default())?;

    page.navigate_fragment("book1-2")?;
    page.advance_time(50)?;
    let logs = page.take_trace_logs();
    assert!(
        logs.iter()
            .any(|line| line.starts_with("[focus] controller=0 focus section#book1-2")),
        "{logs:?}"
    );
    assert!(logs.iter().any(|line| line.starts_with("[event] done hashchange")));
    assert!(logs.iter().any(|line| line.starts_with("[scroll] section#book1-2")));
    assert!(logs.iter().any(|line| line.starts_with("[timer] advance delta_ms=50")));

    page.set_trace_timers(false);
    page.advance_time(1)?;
    assert!(page.take_trace_logs().is_empty());
    Ok(())
}

#[test]
fn trigger_focuses_chapter_whose_id_contains_percent() -> Result<()> {
    let html = "<a id='randomChapterLink' href='#'>Random</a>\
                <div id='bookContainer'><section id='50%'>Half</section></div>";
    let mut page = page_at(html, "")?;
    page.attach(FocusConfig::default())?;

    page.click("#randomChapterLink")?;
    assert_eq!(page.location_hash(), "#50%25");
    assert_eq!(page.history_len(), 2);
    assert_eq!(page.ids_with_class("visible-section"), vec!["50%"]);
    assert!(warnings(&mut page).is_empty());

    page.click("#randomChapterLink")?;
    assert_eq!(page.history_len(), 2);
    assert_eq!(page.ids_with_class("visible-section"), vec!["50%"]);

    page.navigate_fragment("")?;
    assert!(page.ids_with_class("visible-section").is_empty());
    page.navigate_fragment("50%")?;
    assert_eq!(page.location_hash(), "#50%");
    assert_eq!(page.ids_with_class("visible-section"), vec!["50%"]);
    assert!(warnings(&mut page).is_empty());
    Ok(())
}

#[test]
fn random_settlement_writes_a_bookmarkable_fragment() -> Result<()> {
    let html = "<div id='bookContainer'><section id='a%41'>Escaped-looking</section></div>";
    let mut page = page_at(html, "#random")?;
    page.attach(FocusConfig::default().with_trigger_id(None))?;
    page.run_due_timers()?;

    assert_eq!(page.location_href(), format!("{URL}#a%2541"));
    assert_eq!(page.history_len(), 1);
    assert_eq!(page.ids_with_class("visible-section"), vec!["a%41"]);

    let mut reloaded = Page::from_html_with_url(&page.location_href(), html)?;
    reloaded.attach(FocusConfig::default().with_trigger_id(None))?;
    assert_eq!(reloaded.ids_with_class("visible-section"), vec!["a%41"]);
    assert!(warnings(&mut reloaded).is_empty());
    Ok(())
}

#[test]
fn random_settlement_percent_encodes_non_ascii_ids() -> Result<()> {
    let html = "<div id='bookContainer'><section id='第2章'>Chapter two</section></div>";
    let mut page = page_at(html, "#random")?;
    page.attach(FocusConfig::default().with_trigger_id(None))?;
    page.run_due_timers()?;

    assert_eq!(page.location_hash(), "#%E7%AC%AC2%E7%AB%A0");
    assert_eq!(page.ids_with_class("visible-section"), vec!["第2章"]);

    let mut reloaded = Page::from_html_with_url(&page.location_href(), html)?;
    reloaded.attach(FocusConfig::default().with_trigger_id(None))?;
    assert_eq!(reloaded.ids_with_class("visible-section"), vec!["第2章"]);
    Ok(())
}

#[test]
fn clicks_on_disabled_trigger_do_not_consume_random_draws() -> Result<()> {
    let html = "<a id='randomChapterLink' href='#'>Random</a>\
                <div id='emptyBook'><p>No chapters yet.</p></div>\
                <div id='bookContainer'>\
                  <section id='book1-1'></section>\
                  <section id='book1-2'></section>\
                  <section id='book1-3'></section>\
                </div>";
    let run = |clicks: usize| -> Result<String> {
        let mut page = page_at(html, "")?;
        page.set_random_seed(11);
        page.attach(FocusConfig::default().with_trigger_id(None))?;
        page.attach(FocusConfig::default().with_container_id("emptyBook"))?;
        for _ in 0..clicks {
            page.click("#randomChapterLink")?;
        }
        page.navigate_fragment("random")?;
        Ok(page.location_hash().to_string())
    };

    let without_clicks = run(0)?;
    assert!(without_clicks.starts_with("#book1-"), "{without_clicks}");
    assert_eq!(run(3)?, without_clicks);
    Ok(())
}
