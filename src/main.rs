use anyhow::Result;
use view3d::geom::Enclosure;
use view3d::problem::Problem;
use view3d::settings;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = settings::load_config()?;
    let enclosure = Enclosure::from_file(&settings.geom_name)?;
    let problem = Problem::new(enclosure, settings)?;

    let vf = problem.solve()?;
    problem.writeup(&vf)
}
