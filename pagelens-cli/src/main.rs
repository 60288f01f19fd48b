use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use pagelens_core::batch::{parse_url_list, BatchRenderer};
use pagelens_core::entities::{Artifact, Page};
use pagelens_core::output::text::AreaFieldPrinter;
use pagelens_core::output::{png, text, xml};
use pagelens_core::pipeline::{OutputWriter, Pipeline, PipelineOutput};
use pagelens_core::provider::chrome::ChromeTreeProvider;
use pagelens_core::provider::pdf::PdfTreeProvider;
use pagelens_core::provider::{
    coerce_to_url, parse_url, TreeProvider, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
};
use pagelens_core::rdf::model::{build_area_model, build_box_model, write_turtle};
use pagelens_core::rdf::repository::ArtifactRepository;
use pagelens_core::rdf::{IriFactory, QueryResults, Term};
use pagelens_core::segm::ops::{FindLineOperator, SortByPositionOperator};
use pagelens_core::segm::{BasicSegmProvider, GroupingSegmProvider, SegmProvider};
use pagelens_core::workflow::ServiceManager;

/// Page rendered by the demos when no URL is given.
const DEMO_URL: &str = "http://cssbox.sf.net";

/// Fixed query behind the `storage-sparql` demo: every stored text box with
/// its font size and content.
const BOX_QUERY: &str = "\
PREFIX r: <http://pagelens.dev/ontology/render#>
SELECT ?box ?fontSize ?text
WHERE { ?box a r:Box ; r:fontSize ?fontSize ; r:text ?text }
ORDER BY ?box";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Pagelens - document layout analysis demos",
    long_about = "Demo programs for the pagelens toolkit: render web pages and PDF documents \
into box trees, segment them into visual areas, and serialize or store the results."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Chrome,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Segmenter {
    Basic,
    Grouping,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a web page and print its text boxes
    Render {
        #[arg(default_value = DEMO_URL)]
        url: String,

        #[arg(long, value_enum, default_value_t = Backend::Chrome)]
        backend: Backend,
    },
    /// Render a PDF document, print its text boxes and save page previews
    RenderPdf {
        /// Path or URL of the PDF file
        file: String,

        #[arg(long, default_value_t = 1.5)]
        zoom: f32,
    },
    /// Render a PDF document and dump its data fields line by line
    AnalyzePdf {
        /// Path or URL of the PDF file
        file: String,
    },
    /// Segment a page and print the area tree as XML
    Segment {
        #[arg(default_value = DEMO_URL)]
        url: String,

        #[arg(long, value_enum, default_value_t = Segmenter::Basic)]
        provider: Segmenter,
    },
    /// Save the rendered page with box outlines and its internal model as PNG
    PageToPng {
        #[arg(default_value = DEMO_URL)]
        url: String,
    },
    /// Save the segmented page with area outlines and its internal model as PNG
    AreasToPng {
        #[arg(default_value = DEMO_URL)]
        url: String,
    },
    /// Save the rendered box tree as XML
    PageToXml {
        #[arg(default_value = DEMO_URL)]
        url: String,
    },
    /// Save the segmented area tree as XML
    AreasToXml {
        #[arg(default_value = DEMO_URL)]
        url: String,
    },
    /// Save the rendered box tree as RDF/Turtle
    PageToRdf {
        #[arg(default_value = DEMO_URL)]
        url: String,
    },
    /// Save the segmented area tree as RDF/Turtle
    AreasToRdf {
        #[arg(default_value = DEMO_URL)]
        url: String,
    },
    /// Store a page and its segmentation, then query them with SPARQL
    StorageSparql {
        #[arg(default_value = DEMO_URL)]
        url: String,
    },
    /// Render every URL in a list file into a persistent artifact store
    Batch {
        /// File with one URL per line
        url_list: PathBuf,

        /// Directory of the on-disk artifact store
        storage: PathBuf,
    },
    /// Run the service-manager demo: render, segment twice, list the catalog
    Workflow,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PAGELENS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let exit_code = if err.use_stderr() { 1 } else { 0 };
        let _ = err.print();
        std::process::exit(exit_code);
    });

    match cli.command {
        Command::Render { url, backend } => cmd_render(&url, backend),
        Command::RenderPdf { file, zoom } => cmd_render_pdf(&file, zoom),
        Command::AnalyzePdf { file } => cmd_analyze_pdf(&file),
        Command::Segment { url, provider } => cmd_segment(&url, provider),
        Command::PageToPng { url } => cmd_page_to_png(&url),
        Command::AreasToPng { url } => cmd_areas_to_png(&url),
        Command::PageToXml { url } => cmd_page_to_xml(&url),
        Command::AreasToXml { url } => cmd_areas_to_xml(&url),
        Command::PageToRdf { url } => cmd_page_to_rdf(&url),
        Command::AreasToRdf { url } => cmd_areas_to_rdf(&url),
        Command::StorageSparql { url } => cmd_storage_sparql(&url),
        Command::Batch { url_list, storage } => cmd_batch(&url_list, &storage).await,
        Command::Workflow => cmd_workflow(),
    }
}

fn chrome_provider() -> ChromeTreeProvider {
    ChromeTreeProvider::new(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT)
}

fn render_web_page(url: &str, screenshot: bool) -> anyhow::Result<Page> {
    let url = parse_url(url)?;
    chrome_provider().with_screenshot(screenshot).render(&url)
}

fn print_page_info(page: &Page) {
    println!("Url: {}", page.source_url);
    println!("Title: {}", page.title);
    println!(
        "Rendered size: {} x {} px",
        page.width as u32, page.height as u32
    );
}

fn save_png(img: &image::RgbaImage, path: &str) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("can't create {path}"))?;
    let mut writer = BufWriter::new(file);
    png::write_png(img, &mut writer)?;
    writer.flush()?;
    println!(
        "{} Saved: {}",
        "✓".green().bold(),
        path.cyan().underline()
    );
    Ok(())
}

fn save_text_file(contents: &str, path: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("can't create {path}"))?;
    println!(
        "{} Saved: {}",
        "✓".green().bold(),
        path.cyan().underline()
    );
    Ok(())
}

fn cmd_render(url: &str, backend: Backend) -> anyhow::Result<()> {
    let page = match backend {
        Backend::Chrome => render_web_page(url, false)?,
    };
    print_page_info(&page);
    text::print_text_boxes(&page.root, &mut io::stdout().lock())?;
    Ok(())
}

fn cmd_render_pdf(file: &str, zoom: f32) -> anyhow::Result<()> {
    let url = parse_url(&coerce_to_url(file))?;
    let page = PdfTreeProvider::new(zoom).with_screenshot(true).render(&url)?;

    print_page_info(&page);
    text::print_text_boxes(&page.root, &mut io::stdout().lock())?;

    save_png(&png::page_overlay(&page)?, "pdf_page.png")?;
    save_png(&png::page_model(&page), "pdf_page_i.png")
}

/// Dumps the leaf areas of a segmented page as rows of data fields.
struct FieldDumpWriter;

impl OutputWriter for FieldDumpWriter {
    fn write(&self, output: &PipelineOutput) -> anyhow::Result<()> {
        let tree = output
            .area_tree
            .as_ref()
            .context("segmentation produced no tree")?;
        let mut printer = AreaFieldPrinter::new(io::stdout().lock());
        printer.print_leaves(&tree.root)?;
        printer.finish()?;
        Ok(())
    }
}

fn cmd_analyze_pdf(file: &str) -> anyhow::Result<()> {
    let url = parse_url(&coerce_to_url(file))?;
    Pipeline::new(Box::new(PdfTreeProvider::new(1.5)))
        .with_segmenter(Box::new(BasicSegmProvider::new(false)))
        .with_operator(Box::new(SortByPositionOperator))
        .with_operator(Box::new(FindLineOperator::new(0.9)))
        .with_writer(Box::new(FieldDumpWriter))
        .run(&url)?;
    Ok(())
}

fn cmd_segment(url: &str, provider: Segmenter) -> anyhow::Result<()> {
    let page = render_web_page(url, false)?;
    let tree = match provider {
        Segmenter::Basic => BasicSegmProvider::new(true).create_area_tree(&page)?,
        Segmenter::Grouping => GroupingSegmProvider::default().create_area_tree(&page)?,
    };
    print!("{}", xml::area_tree_to_xml(&tree, false));
    Ok(())
}

fn cmd_page_to_png(url: &str) -> anyhow::Result<()> {
    let page = render_web_page(url, true)?;
    save_png(&png::page_overlay(&page)?, "page.png")?;
    save_png(&png::page_model(&page), "page_model.png")
}

fn cmd_areas_to_png(url: &str) -> anyhow::Result<()> {
    let page = render_web_page(url, true)?;
    let tree = BasicSegmProvider::new(true).create_area_tree(&page)?;
    save_png(&png::area_overlay(&tree, &page)?, "areas.png")?;
    save_png(&png::area_model(&tree, &page), "areas_model.png")
}

fn cmd_page_to_xml(url: &str) -> anyhow::Result<()> {
    let page = render_web_page(url, false)?;
    save_text_file(&xml::page_to_xml(&page), "page.xml")
}

fn cmd_areas_to_xml(url: &str) -> anyhow::Result<()> {
    let page = render_web_page(url, false)?;
    let tree = BasicSegmProvider::new(true).create_area_tree(&page)?;
    save_text_file(&xml::area_tree_to_xml(&tree, true), "areas.xml")
}

fn cmd_page_to_rdf(url: &str) -> anyhow::Result<()> {
    let page = render_web_page(url, false)?;
    let factory = IriFactory::default();
    let page_iri = factory.create_artifact_iri(1);
    let triples = build_box_model(&page, &page_iri, &factory)?;

    let mut buf = Vec::new();
    write_turtle(&triples, &mut buf)?;
    save_text_file(&String::from_utf8(buf).context("Turtle output is not UTF-8")?, "page.ttl")
}

fn cmd_areas_to_rdf(url: &str) -> anyhow::Result<()> {
    let mut page = render_web_page(url, false)?;
    let factory = IriFactory::default();
    page.iri = Some(factory.create_artifact_iri(1));
    let tree = BasicSegmProvider::new(true).create_area_tree(&page)?;
    let tree_iri = factory.create_artifact_iri(2);
    let triples = build_area_model(&tree, &tree_iri, &factory)?;

    let mut buf = Vec::new();
    write_turtle(&triples, &mut buf)?;
    save_text_file(&String::from_utf8(buf).context("Turtle output is not UTF-8")?, "areas.ttl")
}

fn cmd_storage_sparql(url: &str) -> anyhow::Result<()> {
    let repository = ArtifactRepository::create_memory()?;

    let mut page = Artifact::Page(render_web_page(url, false)?);
    repository.add_artifact(&mut page)?;
    let stored_page = page.as_page().context("stored artifact is not a page")?;
    let tree = BasicSegmProvider::new(true).create_area_tree(stored_page)?;
    repository.add_artifact(&mut Artifact::AreaTree(tree))?;

    let QueryResults::Solutions(solutions) = repository.query(BOX_QUERY)? else {
        anyhow::bail!("unexpected result form for a SELECT query");
    };
    for solution in solutions {
        let solution = solution?;
        let (Some(b), Some(size), Some(text)) = (
            solution.get("box"),
            solution.get("fontSize"),
            solution.get("text"),
        ) else {
            continue;
        };
        println!("{b}\t{} px\t'{}'", literal_value(size), literal_value(text));
    }
    repository.disconnect()
}

fn literal_value(term: &Term) -> String {
    match term {
        Term::Literal(lit) => lit.value().to_owned(),
        other => other.to_string(),
    }
}

async fn cmd_batch(url_list: &PathBuf, storage: &PathBuf) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(url_list)
        .with_context(|| format!("can't read the URL list {}", url_list.display()))?;
    let urls = parse_url_list(&contents);

    let repository = ArtifactRepository::create_native(storage)?;
    let provider: Arc<dyn TreeProvider> = Arc::new(chrome_provider().with_screenshot(true));
    let renderer = BatchRenderer::new(provider, repository);

    let pb = ProgressBar::new(urls.len() as u64);
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} pages",
    )?);
    let outcomes = renderer
        .run_with_progress(urls, |outcome| {
            match &outcome.result {
                Ok(iri) => pb.println(format!("{} --> {}", outcome.url, iri)),
                Err(e) => pb.println(format!("{} --> {}: {e:#}", outcome.url, "failed".red())),
            }
            pb.inc(1);
        })
        .await?;
    pb.finish_and_clear();

    let stored = outcomes.iter().filter(|o| o.result.is_ok()).count();
    println!(
        "{} {} of {} pages stored in: {}",
        "✓".green().bold(),
        stored,
        outcomes.len(),
        storage.display().to_string().cyan().underline()
    );
    Ok(())
}

fn cmd_workflow() -> anyhow::Result<()> {
    let repository = ArtifactRepository::create_memory()?;
    let mut manager = ServiceManager::with_default_services();
    manager.set_artifact_repository(repository.clone());

    let params = serde_json::json!({ "url": DEMO_URL, "screenshot": false });
    let params = params.as_object().context("render parameters are not an object")?;
    let page = manager.apply_artifact_service("pagelens.chrome-render", params, None)?;

    let no_params = serde_json::Map::new();
    manager.apply_artifact_service("pagelens.basic-areas", &no_params, Some(&page))?;
    manager.apply_artifact_service("pagelens.grouping", &no_params, Some(&page))?;

    for info in repository.artifact_infos()? {
        println!(
            "{}\t{}\tcreator={}\tparent={}",
            info.iri,
            info.artifact_type,
            info.creator.unwrap_or_else(|| "-".to_owned()),
            info.parent_iri
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_owned()),
        );
    }
    repository.disconnect()
}
